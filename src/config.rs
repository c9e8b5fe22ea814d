//! Session configuration and UI-field parsing.
//!
//! The window and interval inputs are free-form text on the dashboard side;
//! empty or non-numeric values fall back to the defaults below rather than
//! erroring.

/// Default rolling-window length in minutes.
pub const DEFAULT_WINDOW_MINUTES: f64 = 2.0;
/// Default sampling interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u32 = 1;
/// Default trend aggregation limit forwarded with `configure`.
pub const DEFAULT_TREND_LIMIT: u32 = 3;

/// Current monitoring settings, owned by the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Executable name to monitor.
    pub exe: String,
    /// Sampling interval in seconds; also drives the window capacity.
    pub interval_secs: u32,
    /// Rolling real-time window length in minutes.
    pub window_minutes: f64,
    /// Trend aggregation limit forwarded to the backend.
    pub trend_limit: u32,
    /// Client-side cap on trend retention. `None` keeps every point pushed
    /// during the session.
    pub trend_cap: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exe: String::new(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            trend_limit: DEFAULT_TREND_LIMIT,
            trend_cap: None,
        }
    }
}

impl SessionConfig {
    /// Points retained in the real-time window under the current settings:
    /// `floor(window_minutes * 60 / interval_secs)`, at least 1.
    ///
    /// Recomputed on every insert, so live edits to the window or interval
    /// change trimming behavior without an explicit resize.
    pub fn window_capacity(&self) -> usize {
        let interval = self.interval_secs.max(1) as f64;
        ((self.window_minutes * 60.0) / interval).floor().max(1.0) as usize
    }
}

/// Parse a numeric UI field, falling back to `default` when the field is
/// empty, non-numeric, or non-positive.
pub fn field_or_default_f64(input: &str, default: f64) -> f64 {
    match input.trim().parse::<f64>() {
        Ok(v) if v > 0.0 => v,
        _ => default,
    }
}

/// Integer variant of [`field_or_default_f64`].
pub fn field_or_default_u32(input: &str, default: u32) -> u32 {
    match input.trim().parse::<u32>() {
        Ok(v) if v > 0 => v,
        _ => default,
    }
}
