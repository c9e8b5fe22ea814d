//! Error taxonomy for the dashboard client.
//!
//! Nothing here is fatal: validation and transport failures surface to the
//! caller and the status line, decode failures drop the offending frame, and
//! the session keeps running.

use thiserror::Error;

/// User-command validation and delivery failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("process name must not be empty")]
    EmptyExeName,

    #[error("a build is already in flight")]
    BuildInFlight,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Malformed inbound frame. The frame is dropped and logged; the session
/// continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("message has no type tag")]
    MissingType,

    #[error("bad {kind} payload: {detail}")]
    Payload { kind: &'static str, detail: String },
}

/// Control-channel send failures, surfaced explicitly instead of vanishing at
/// the transport layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("control channel is not connected")]
    NotConnected,

    #[error("control channel task has shut down")]
    Closed,
}

/// Process-directory fetch failures.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("process list request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("process list request returned HTTP {0}")]
    Status(u16),
}
