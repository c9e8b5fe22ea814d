//! Render-sink seam between the session core and whatever draws the charts.
//!
//! The session pushes read-only series projections through [`RenderSink`];
//! what happens on the other side (a charting frontend, a log line, a test
//! recorder) is opaque to the core. Sinks are created per monitoring run and
//! dropped on stop, so a disposed chart can never be painted by a late frame.

use tracing::debug;

use crate::core::data::MetricColumn;

/// The two chart windows the session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartWindow {
    Realtime,
    Trend,
}

impl ChartWindow {
    pub fn name(&self) -> &'static str {
        match self {
            ChartWindow::Realtime => "realtime",
            ChartWindow::Trend => "trend",
        }
    }
}

/// Receives a full projection of one series store after each update.
pub trait RenderSink: Send {
    /// Replace the sink's contents with the given labels and metric columns.
    fn render_series(&mut self, categories: &[String], series: &[MetricColumn]);
}

/// Creates fresh sink handles. Invoked once per chart window on every
/// session start.
pub trait SinkFactory: Send {
    fn create(&mut self, window: ChartWindow) -> Box<dyn RenderSink>;
}

/// Sink that reports projections through `tracing` — the headless CLI's
/// stand-in for a chart.
pub struct LogSink {
    window: ChartWindow,
}

impl LogSink {
    pub fn new(window: ChartWindow) -> Self {
        Self { window }
    }
}

impl RenderSink for LogSink {
    fn render_series(&mut self, categories: &[String], series: &[MetricColumn]) {
        let latest: Vec<(&str, f64)> = series
            .iter()
            .map(|col| (col.name, col.values.last().copied().unwrap_or(0.0)))
            .collect();
        debug!(
            window = self.window.name(),
            points = categories.len(),
            at = categories.last().map(String::as_str).unwrap_or("-"),
            latest = ?latest,
            "series updated"
        );
    }
}

/// Factory producing [`LogSink`]s.
pub struct LogSinkFactory;

impl SinkFactory for LogSinkFactory {
    fn create(&mut self, window: ChartWindow) -> Box<dyn RenderSink> {
        Box::new(LogSink::new(window))
    }
}
