//! Streaming-session state machine.
//!
//! Owns the two series stores, the per-window render-sink handles, and the
//! outbound command path. Inbound frames and user commands both funnel
//! through here, so every ordering hazard (stop racing a late push, a build
//! trigger racing its completion log, a channel drop mid-run) is resolved in
//! one place.

use tracing::{debug, info, trace, warn};

use super::data::{MetricSeries, TrendSeries};
use super::protocol::{
    self, Command, Inbound, RawSample, StatusLog, TrendPayload, REALTIME_METRICS, TREND_METRICS,
};
use crate::config::SessionConfig;
use crate::error::{SessionError, TransportError};
use crate::sink::{ChartWindow, RenderSink, SinkFactory};

/// Message prefixes the build pipeline emits on completion. A status frame
/// matching one of these ends an in-flight build; the structured `success`
/// field then decides how it went.
const BUILD_MARKERS: &[&str] = &["BUILD SUCCESSFUL", "FAILED", "SYSTEM ERROR"];

/// Where the session sits in the configure/start/stop lifecycle.
///
/// `stop` returns to `Idle`, not `Configured`: each monitoring run requires
/// one configure beforehand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Configured,
    Monitoring,
}

/// Delivers encoded commands to the backend.
pub trait CommandTransport: Send {
    fn send(&self, cmd: &Command) -> Result<(), TransportError>;
}

/// Last status line, either pushed by the backend or produced locally when a
/// send fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub ok: bool,
}

/// The dashboard session: state machine plus owned series stores and sinks.
pub struct Session {
    phase: SessionPhase,
    connected: bool,
    config: SessionConfig,
    realtime: MetricSeries,
    trend: TrendSeries,
    realtime_sink: Option<Box<dyn RenderSink>>,
    trend_sink: Option<Box<dyn RenderSink>>,
    sinks: Box<dyn SinkFactory>,
    transport: Box<dyn CommandTransport>,
    status: StatusLine,
    build_in_flight: bool,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        sinks: Box<dyn SinkFactory>,
        transport: Box<dyn CommandTransport>,
    ) -> Self {
        let trend_cap = config.trend_cap;
        Self {
            phase: SessionPhase::Idle,
            connected: false,
            config,
            realtime: MetricSeries::new(REALTIME_METRICS),
            trend: TrendSeries::new(TREND_METRICS, trend_cap),
            realtime_sink: None,
            trend_sink: None,
            sinks,
            transport,
            status: StatusLine::default(),
            build_in_flight: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn realtime(&self) -> &MetricSeries {
        &self.realtime
    }

    pub fn trend(&self) -> &TrendSeries {
        &self.trend
    }

    pub fn is_build_in_flight(&self) -> bool {
        self.build_in_flight
    }

    /// Whether the Start affordance should be enabled.
    pub fn can_start(&self) -> bool {
        self.phase == SessionPhase::Configured
    }

    /// Update the rolling-window length. Takes effect on the next insert;
    /// no explicit resize happens here.
    pub fn set_window_minutes(&mut self, minutes: f64) {
        self.config.window_minutes = minutes;
    }

    // ------------------------------------------------------------------
    // User commands
    // ------------------------------------------------------------------

    /// Send the monitoring configuration to the backend.
    ///
    /// An empty process name is rejected before anything reaches the wire.
    pub fn configure(
        &mut self,
        exe: &str,
        interval_secs: u32,
        trend_limit: u32,
    ) -> Result<(), SessionError> {
        let exe = exe.trim();
        if exe.is_empty() {
            warn!("rejecting configure: empty process name");
            return Err(SessionError::EmptyExeName);
        }

        self.send(Command::Configure {
            exe: exe.to_string(),
            interval: interval_secs,
            limit: trend_limit,
        })?;

        self.config.exe = exe.to_string();
        self.config.interval_secs = interval_secs;
        self.config.trend_limit = trend_limit;
        self.phase = SessionPhase::Configured;
        info!(exe, interval_secs, trend_limit, "session configured");
        Ok(())
    }

    /// Begin a monitoring run.
    ///
    /// Both stores and both sink handles are recreated, not merely cleared:
    /// nothing rendered by a previous run can leak into this one.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.send(Command::Start)?;

        self.realtime = MetricSeries::new(REALTIME_METRICS);
        self.trend = TrendSeries::new(TREND_METRICS, self.config.trend_cap);
        self.realtime_sink = Some(self.sinks.create(ChartWindow::Realtime));
        self.trend_sink = Some(self.sinks.create(ChartWindow::Trend));
        self.phase = SessionPhase::Monitoring;
        info!(exe = %self.config.exe, "monitoring started");
        Ok(())
    }

    /// End the monitoring run and dispose both sink handles.
    ///
    /// Frames still in flight on the channel will find no sink and be
    /// dropped by the dispatcher's existence check.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.send(Command::Stop)?;
        self.dispose_sinks();
        self.phase = SessionPhase::Idle;
        info!("monitoring stopped");
        Ok(())
    }

    /// Trigger a rebuild of the controlled system. Gated: only one build may
    /// be in flight, until a status frame reports its outcome.
    pub fn request_build(&mut self) -> Result<(), SessionError> {
        if self.build_in_flight {
            debug!("build trigger ignored: already in flight");
            return Err(SessionError::BuildInFlight);
        }
        self.send(Command::TradeUpdate)?;
        self.build_in_flight = true;
        info!("build requested");
        Ok(())
    }

    /// Launch the controlled system's processes.
    pub fn start_system(&mut self) -> Result<(), SessionError> {
        self.send(Command::TradeStart)?;
        Ok(())
    }

    /// Terminate the controlled system's processes.
    pub fn stop_system(&mut self) -> Result<(), SessionError> {
        self.send(Command::TradeStop)?;
        Ok(())
    }

    fn send(&mut self, cmd: Command) -> Result<(), SessionError> {
        if let Err(e) = self.transport.send(&cmd) {
            warn!(error = %e, command = ?cmd, "command send failed");
            self.status = StatusLine {
                text: format!("send failed: {e}"),
                ok: false,
            };
            return Err(e.into());
        }
        trace!(command = ?cmd, "command sent");
        Ok(())
    }

    fn dispose_sinks(&mut self) {
        self.realtime_sink = None;
        self.trend_sink = None;
    }

    // ------------------------------------------------------------------
    // Channel lifecycle hooks
    // ------------------------------------------------------------------

    pub fn on_channel_opened(&mut self) {
        self.connected = true;
        info!("control channel connected");
    }

    /// The transport reconnects on its own, but a run interrupted by a drop
    /// cannot be resumed: the session never stays in `Monitoring` against a
    /// dead channel.
    pub fn on_channel_closed(&mut self) {
        self.connected = false;
        if self.phase == SessionPhase::Monitoring {
            warn!("control channel lost while monitoring; session reset");
            self.dispose_sinks();
            self.phase = SessionPhase::Idle;
        } else {
            info!("control channel closed");
        }
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    /// Decode and dispatch one inbound frame from the control channel.
    ///
    /// Never fails: undecodable frames are dropped with a warning, unknown
    /// types are ignored as protocol drift.
    pub fn handle_message(&mut self, raw: &str) {
        match protocol::decode(raw) {
            Ok(Some(msg)) => self.dispatch(msg),
            Ok(None) => trace!("ignoring message with unknown type"),
            Err(e) => warn!(error = %e, "dropping undecodable message"),
        }
    }

    fn dispatch(&mut self, msg: Inbound) {
        match msg {
            Inbound::Realtime(sample) => self.on_realtime(sample),
            Inbound::TrendPush(payload) | Inbound::HistoryTrend(payload) => self.on_trend(payload),
            Inbound::StatusLog(status) => self.on_status(status),
        }
    }

    fn on_realtime(&mut self, sample: RawSample) {
        // Sink existence is the authoritative gate: after stop(), frames
        // still in flight land here and are dropped.
        let Some(sink) = self.realtime_sink.as_mut() else {
            trace!("realtime frame with no active window, dropped");
            return;
        };
        let Some(point) = sample.to_point() else {
            warn!(timestamp = %sample.timestamp, "realtime sample without time-of-day, dropped");
            return;
        };

        self.realtime.push(&point, self.config.window_capacity());
        let (labels, columns) = self.realtime.snapshot();
        sink.render_series(labels, columns);
    }

    fn on_trend(&mut self, payload: TrendPayload) {
        let Some(sink) = self.trend_sink.as_mut() else {
            trace!("trend frame with no active window, dropped");
            return;
        };

        let mut applied = 0usize;
        for trend_point in payload.points() {
            match trend_point.to_point() {
                Some(point) => {
                    self.trend.push(&point);
                    applied += 1;
                }
                None => {
                    warn!(timestamp = %trend_point.timestamp, "trend point without time-of-day, dropped")
                }
            }
        }
        debug!(applied, total = self.trend.len(), "trend points applied");

        let (labels, columns) = self.trend.snapshot();
        sink.render_series(labels, columns);
    }

    fn on_status(&mut self, status: StatusLog) {
        if self.build_in_flight {
            if let Some(ok) = build_outcome(&status) {
                self.build_in_flight = false;
                info!(ok, message = %status.message, "build finished");
            }
        }

        // `success` is authoritative where present; legacy frames fall back
        // to the "started" marker the old dashboard keyed its indicator on.
        let ok = status
            .success
            .unwrap_or_else(|| status.message.contains("started"));
        debug!(ok, message = %status.message, "status updated");
        self.status = StatusLine {
            text: status.message,
            ok,
        };
    }
}

/// Classify a status frame as the outcome of an in-flight build.
///
/// The message text decides *whether* this frame is a build result (the
/// backend tags every response with `success`, so the flag alone cannot);
/// the structured field then decides how it went, with the legacy marker
/// as fallback for backends that omit it.
fn build_outcome(status: &StatusLog) -> Option<bool> {
    let is_build = BUILD_MARKERS.iter().any(|m| status.message.contains(m));
    is_build.then(|| {
        status
            .success
            .unwrap_or_else(|| status.message.contains("BUILD SUCCESSFUL"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::MetricColumn;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records encoded commands; optionally fails every send.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl CommandTransport for RecordingTransport {
        fn send(&self, cmd: &Command) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::NotConnected);
            }
            self.sent.lock().push(serde_json::to_string(cmd).unwrap());
            Ok(())
        }
    }

    /// Records every projection pushed to any sink, tagged by window.
    #[derive(Clone, Default)]
    struct RecordingSinks {
        frames: Arc<Mutex<Vec<(ChartWindow, usize)>>>,
        created: Arc<Mutex<Vec<ChartWindow>>>,
    }

    struct RecordingSink {
        window: ChartWindow,
        frames: Arc<Mutex<Vec<(ChartWindow, usize)>>>,
    }

    impl RenderSink for RecordingSink {
        fn render_series(&mut self, categories: &[String], _series: &[MetricColumn]) {
            self.frames.lock().push((self.window, categories.len()));
        }
    }

    impl SinkFactory for RecordingSinks {
        fn create(&mut self, window: ChartWindow) -> Box<dyn RenderSink> {
            self.created.lock().push(window);
            Box::new(RecordingSink {
                window,
                frames: self.frames.clone(),
            })
        }
    }

    fn session_with(
        transport: RecordingTransport,
        sinks: RecordingSinks,
    ) -> Session {
        Session::new(
            SessionConfig::default(),
            Box::new(sinks),
            Box::new(transport),
        )
    }

    fn realtime_frame(ts: &str, mem: f64) -> String {
        format!(
            r#"{{"type":"realtime","data":{{"timestamp":"{ts}","cpu_percent":"1","threads":"2","handles":"3","memory_mb":"{mem}"}}}}"#
        )
    }

    #[test]
    fn test_configure_empty_exe_sends_nothing() {
        let transport = RecordingTransport::default();
        let mut session = session_with(transport.clone(), RecordingSinks::default());

        assert_eq!(session.configure("  ", 1, 3), Err(SessionError::EmptyExeName));
        assert!(transport.sent.lock().is_empty());
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_configure_start_stop_lifecycle() {
        let transport = RecordingTransport::default();
        let sinks = RecordingSinks::default();
        let mut session = session_with(transport.clone(), sinks.clone());

        session.configure("app.exe", 2, 5).unwrap();
        assert_eq!(session.phase(), SessionPhase::Configured);
        assert!(session.can_start());

        session.start().unwrap();
        assert_eq!(session.phase(), SessionPhase::Monitoring);
        assert_eq!(
            *sinks.created.lock(),
            vec![ChartWindow::Realtime, ChartWindow::Trend]
        );

        session.stop().unwrap();
        // Stop lands back in Idle: a new run needs a fresh configure.
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.can_start());

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].contains(r#""type":"configure"#));
        assert!(sent[1].contains(r#""type":"start"#));
        assert!(sent[2].contains(r#""type":"stop"#));
    }

    #[test]
    fn test_start_recreates_stores() {
        let mut session =
            session_with(RecordingTransport::default(), RecordingSinks::default());
        session.configure("app.exe", 1, 3).unwrap();
        session.start().unwrap();

        session.handle_message(&realtime_frame("2024-03-01 10:00:00", 100.0));
        session.handle_message(&realtime_frame("2024-03-01 10:00:01", 101.0));
        assert_eq!(session.realtime().len(), 2);

        // Starting again while data is held must yield fresh, empty stores.
        session.start().unwrap();
        assert!(session.realtime().is_empty());
        assert!(session.trend().is_empty());
    }

    #[test]
    fn test_realtime_frame_updates_window_and_renders() {
        let sinks = RecordingSinks::default();
        let mut session = session_with(RecordingTransport::default(), sinks.clone());
        session.configure("app.exe", 1, 3).unwrap();
        session.start().unwrap();

        session.handle_message(&realtime_frame("2024-03-01 10:00:00", 100.0));
        assert_eq!(session.realtime().len(), 1);
        let (labels, columns) = session.realtime().snapshot();
        assert_eq!(labels, &["10:00:00"]);
        assert_eq!(columns[3].name, "memory_mb");
        assert_eq!(columns[3].values, vec![100.0]);
        assert_eq!(*sinks.frames.lock(), vec![(ChartWindow::Realtime, 1)]);
    }

    #[test]
    fn test_late_realtime_after_stop_is_dropped() {
        let sinks = RecordingSinks::default();
        let mut session = session_with(RecordingTransport::default(), sinks.clone());
        session.configure("app.exe", 1, 3).unwrap();
        session.start().unwrap();
        session.handle_message(&realtime_frame("2024-03-01 10:00:00", 100.0));
        session.stop().unwrap();

        let frames_before = sinks.frames.lock().len();
        session.handle_message(&realtime_frame("2024-03-01 10:00:01", 101.0));

        // No render, no growth, no error.
        assert_eq!(sinks.frames.lock().len(), frames_before);
        assert_eq!(session.realtime().len(), 1);
    }

    #[test]
    fn test_malformed_timestamp_leaves_window_unchanged() {
        let mut session =
            session_with(RecordingTransport::default(), RecordingSinks::default());
        session.configure("app.exe", 1, 3).unwrap();
        session.start().unwrap();

        session.handle_message(&realtime_frame("2024-03-01 10:00:00", 100.0));
        session.handle_message(&realtime_frame("garbage", 101.0));
        session.handle_message(r#"{"type":"realtime","data":{"memory_mb":"5"}}"#);
        assert_eq!(session.realtime().len(), 1);
    }

    #[test]
    fn test_trend_batch_then_single_arrive_in_order() {
        let mut session =
            session_with(RecordingTransport::default(), RecordingSinks::default());
        session.configure("app.exe", 1, 3).unwrap();
        session.start().unwrap();

        session.handle_message(
            r#"{"type":"trend_push","data":[
                {"timestamp":"2024-03-01 10:00:00","avg_memory":"1"},
                {"timestamp":"2024-03-01 10:01:00","avg_memory":"2"}
            ]}"#,
        );
        session.handle_message(
            r#"{"type":"history_trend","data":{"timestamp":"2024-03-01 10:02:00","avg_memory":"3"}}"#,
        );

        assert_eq!(session.trend().len(), 3);
        let (labels, columns) = session.trend().snapshot();
        assert_eq!(labels, &["10:00:00", "10:01:00", "10:02:00"]);
        assert_eq!(columns[0].values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unknown_and_malformed_messages_are_harmless() {
        let mut session =
            session_with(RecordingTransport::default(), RecordingSinks::default());
        session.handle_message(r#"{"type":"heartbeat"}"#);
        session.handle_message("not json at all");
        session.handle_message(r#"{"no_type":1}"#);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_build_gating_and_structured_completion() {
        let transport = RecordingTransport::default();
        let mut session = session_with(transport.clone(), RecordingSinks::default());

        session.request_build().unwrap();
        assert!(session.is_build_in_flight());
        assert_eq!(session.request_build(), Err(SessionError::BuildInFlight));

        // Unrelated status frames must not re-enable the trigger.
        session.handle_message(r#"{"type":"status_log","success":true,"message":"Monitor started (PID: 9)"}"#);
        assert!(session.is_build_in_flight());

        session.handle_message(
            r#"{"type":"status_log","success":false,"message":"MAKE FAILED: linker exploded"}"#,
        );
        assert!(!session.is_build_in_flight());
        assert!(!session.status().ok);

        // And the trigger is usable again.
        session.request_build().unwrap();
    }

    #[test]
    fn test_build_completion_legacy_string_form() {
        let mut session =
            session_with(RecordingTransport::default(), RecordingSinks::default());
        session.request_build().unwrap();

        session.handle_message(
            r#"{"type":"status_log","message":"BUILD SUCCESSFUL: System is up to date."}"#,
        );
        assert!(!session.is_build_in_flight());
    }

    #[test]
    fn test_status_line_tracks_messages() {
        let mut session =
            session_with(RecordingTransport::default(), RecordingSinks::default());

        session.handle_message(r#"{"type":"status_log","success":true,"message":"Monitor started (PID: 9)"}"#);
        assert_eq!(session.status().text, "Monitor started (PID: 9)");
        assert!(session.status().ok);

        // Legacy frame: fall back to the "started" marker.
        session.handle_message(r#"{"type":"status_log","message":"Monitor stopped."}"#);
        assert!(!session.status().ok);
    }

    #[test]
    fn test_transport_failure_surfaces_and_blocks_transition() {
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let mut session = session_with(transport, RecordingSinks::default());

        let err = session.configure("app.exe", 1, 3).unwrap_err();
        assert_eq!(
            err,
            SessionError::Transport(TransportError::NotConnected)
        );
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.status().ok);
        assert!(session.status().text.contains("send failed"));
    }

    #[test]
    fn test_channel_drop_while_monitoring_resets_session() {
        let sinks = RecordingSinks::default();
        let mut session = session_with(RecordingTransport::default(), sinks.clone());
        session.on_channel_opened();
        assert!(session.is_connected());

        session.configure("app.exe", 1, 3).unwrap();
        session.start().unwrap();
        session.on_channel_closed();

        assert!(!session.is_connected());
        assert_eq!(session.phase(), SessionPhase::Idle);

        // Frames drained after the drop find no sink.
        let frames_before = sinks.frames.lock().len();
        session.handle_message(&realtime_frame("2024-03-01 10:00:00", 100.0));
        assert_eq!(sinks.frames.lock().len(), frames_before);
    }

    #[test]
    fn test_live_window_shrink_trims_on_next_insert() {
        let mut session =
            session_with(RecordingTransport::default(), RecordingSinks::default());
        session.configure("app.exe", 60, 3).unwrap(); // 1-minute samples
        session.set_window_minutes(10.0); // capacity 10
        session.start().unwrap();

        for i in 0..10 {
            session.handle_message(&realtime_frame(&format!("2024-03-01 10:{i:02}:00"), i as f64));
        }
        assert_eq!(session.realtime().len(), 10);

        session.set_window_minutes(3.0); // capacity 3
        session.handle_message(&realtime_frame("2024-03-01 10:10:00", 10.0));
        assert_eq!(session.realtime().len(), 3);
        let (labels, _) = session.realtime().snapshot();
        assert_eq!(labels, &["10:08:00", "10:09:00", "10:10:00"]);
    }
}
