//! Headless dashboard CLI: drives a full monitoring session end to end.
//!
//! Run with: cargo run --bin procpulse

use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use procpulse::channel::{ChannelEvent, ControlChannel};
use procpulse::config::{self, SessionConfig};
use procpulse::core::session::{Session, SessionPhase};
use procpulse::directory::ProcessDirectory;
use procpulse::sink::LogSinkFactory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,procpulse=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let ws_url =
        std::env::var("MONITOR_WS").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string());
    let http_base =
        std::env::var("MONITOR_HTTP").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

    let mut cfg = SessionConfig::default();
    if let Ok(exe) = std::env::var("MONITOR_EXE") {
        cfg.exe = exe;
    }
    if let Ok(v) = std::env::var("MONITOR_INTERVAL") {
        cfg.interval_secs = config::field_or_default_u32(&v, cfg.interval_secs);
    }
    if let Ok(v) = std::env::var("MONITOR_WINDOW_MIN") {
        cfg.window_minutes = config::field_or_default_f64(&v, cfg.window_minutes);
    }
    if let Ok(v) = std::env::var("MONITOR_TREND_LIMIT") {
        cfg.trend_limit = config::field_or_default_u32(&v, cfg.trend_limit);
    }

    let directory = ProcessDirectory::new(http_base.as_str());
    match directory.list().await {
        Ok(processes) => {
            info!(count = processes.len(), "process directory fetched");
            if cfg.exe.is_empty() {
                // Headless default: monitor the first listed process.
                if let Some(first) = processes.first() {
                    info!(exe = %first, "no MONITOR_EXE set, using first directory entry");
                    cfg.exe = first.clone();
                }
            }
        }
        Err(e) => warn!(error = %e, "process directory unavailable"),
    }

    let exe = cfg.exe.clone();
    let interval = cfg.interval_secs;
    let limit = cfg.trend_limit;

    info!(url = %ws_url, "connecting to monitoring backend");
    let mut channel = ControlChannel::connect(&ws_url);
    let mut session = Session::new(cfg, Box::new(LogSinkFactory), Box::new(channel.handle()));

    let mut stats = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            event = channel.events.recv() => {
                match event {
                    Some(ChannelEvent::Opened) => {
                        session.on_channel_opened();
                        // (Re-)arm the run: a drop resets the session to Idle,
                        // so each connection gets its own configure + start.
                        match session.configure(&exe, interval, limit) {
                            Ok(()) => {
                                if let Err(e) = session.start() {
                                    error!(error = %e, "failed to start monitoring run");
                                }
                            }
                            Err(e) => error!(error = %e, "failed to configure monitoring run"),
                        }
                    }
                    Some(ChannelEvent::Frame(text)) => session.handle_message(&text),
                    Some(ChannelEvent::Closed) => session.on_channel_closed(),
                    None => {
                        error!("control channel task ended");
                        break;
                    }
                }
            }
            _ = stats.tick() => {
                info!(
                    phase = ?session.phase(),
                    connected = session.is_connected(),
                    realtime = session.realtime().len(),
                    trend = session.trend().len(),
                    status = %session.status().text,
                    "stats"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                if session.phase() == SessionPhase::Monitoring {
                    if let Err(e) = session.stop() {
                        warn!(error = %e, "stop command failed");
                    }
                }
                break;
            }
        }
    }

    Ok(())
}
