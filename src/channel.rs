//! Control-channel WebSocket client.
//!
//! Runs tokio-tungstenite in a background thread with channel-based message
//! passing: commands go in through a [`ChannelHandle`], frames and
//! connection transitions come out as [`ChannelEvent`]s for the embedding
//! loop to drain. The task reconnects on its own with bounded exponential
//! backoff; the session learns about transitions through the events and is
//! never left monitoring a dead link.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

use crate::core::protocol::Command;
use crate::core::session::CommandTransport;
use crate::error::TransportError;

const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Connection state shared between the background task and the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Connecting,
    Connected,
    /// Waiting out the backoff delay before the given attempt.
    Reconnecting { attempt: u32 },
    /// The background task has terminated; no further reconnects.
    Closed,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

/// What the background task delivers to the embedding loop.
#[derive(Debug)]
pub enum ChannelEvent {
    Opened,
    Frame(String),
    Closed,
}

/// Outbound half of the channel. Cloneable; safe to hand to the session.
#[derive(Clone)]
pub struct ChannelHandle {
    tx: UnboundedSender<Command>,
    state: Arc<Mutex<LinkState>>,
}

impl CommandTransport for ChannelHandle {
    /// Hand a command to the connection task.
    ///
    /// Fails with an explicit error when the link is down instead of letting
    /// the command vanish at the transport layer.
    fn send(&self, cmd: &Command) -> Result<(), TransportError> {
        if !self.state.lock().is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(cmd.clone())
            .map_err(|_| TransportError::Closed)
    }
}

/// The control channel: owns the event stream out of the background task.
pub struct ControlChannel {
    /// Inbound frames and connection transitions, in arrival order.
    pub events: UnboundedReceiver<ChannelEvent>,
    handle: ChannelHandle,
}

impl ControlChannel {
    /// Spawn the background connection task for `url`.
    ///
    /// The task owns its own tokio runtime on a dedicated thread and keeps
    /// reconnecting until the [`ControlChannel`] is dropped.
    pub fn connect(url: &str) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(LinkState::Connecting));

        let url = url.to_string();
        let task_state = state.clone();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "failed to create channel runtime");
                    *task_state.lock() = LinkState::Closed;
                    let _ = event_tx.send(ChannelEvent::Closed);
                    return;
                }
            };
            rt.block_on(run_channel(&url, cmd_rx, event_tx, task_state.clone()));
            *task_state.lock() = LinkState::Closed;
        });

        Self {
            events,
            handle: ChannelHandle { tx: cmd_tx, state },
        }
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LinkState {
        self.handle.state.lock().clone()
    }
}

async fn run_channel(
    url: &str,
    mut cmd_rx: UnboundedReceiver<Command>,
    event_tx: UnboundedSender<ChannelEvent>,
    state: Arc<Mutex<LinkState>>,
) {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    let mut backoff = BACKOFF_INITIAL;
    let mut attempt = 0u32;

    loop {
        info!(url, attempt, "connecting control channel");
        let ws_stream = match connect_async(url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(error = %e, delay_ms = backoff.as_millis() as u64, "connect failed, backing off");
                *state.lock() = LinkState::Reconnecting { attempt };
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_MAX);
                attempt += 1;
                continue;
            }
        };

        info!("control channel connected");
        *state.lock() = LinkState::Connected;
        if event_tx.send(ChannelEvent::Opened).is_err() {
            return; // receiver dropped, shut down
        }
        backoff = BACKOFF_INITIAL;
        attempt = 0;

        let (mut write, mut read) = ws_stream.split();
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("command side dropped, closing channel");
                        return;
                    };
                    let frame = match serde_json::to_string(&cmd) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!(error = %e, "command encode failed");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        error!(error = %e, "command send failed");
                        break;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if event_tx.send(ChannelEvent::Frame(text.to_string())).is_err() {
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("control channel closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "control channel error");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        *state.lock() = LinkState::Reconnecting { attempt };
        if event_tx.send(ChannelEvent::Closed).is_err() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(BACKOFF_MAX);
        attempt += 1;
    }
}
