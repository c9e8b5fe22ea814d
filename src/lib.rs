//! Live telemetry dashboard client core.
//!
//! Maintains a persistent control-channel connection to a monitoring
//! backend and drives:
//! - Two rolling time-series views: a short-window real-time chart and a
//!   long-window trend chart, fed by server pushes.
//! - The remote process-lifecycle protocol: configure / start / stop, plus
//!   build and system start/stop for the controlled system.
//!
//! Chart drawing is an external collaborator behind [`sink::RenderSink`];
//! this crate only produces the projections.

pub mod channel;
pub mod config;
pub mod core;
pub mod directory;
pub mod error;
pub mod sink;

pub use channel::{ChannelEvent, ChannelHandle, ControlChannel, LinkState};
pub use config::SessionConfig;
pub use core::data::{MetricColumn, MetricSeries, SeriesPoint, TrendSeries};
pub use core::protocol::{Command, Inbound};
pub use core::session::{CommandTransport, Session, SessionPhase, StatusLine};
pub use directory::ProcessDirectory;
pub use error::{DecodeError, DirectoryError, SessionError, TransportError};
pub use sink::{ChartWindow, RenderSink, SinkFactory};
