//! Control-channel envelopes.
//!
//! Both directions share the tagged `{type, data}` shape. Outbound commands
//! serialize straight from [`Command`]; inbound frames are decoded once at
//! the boundary into [`Inbound`], so nothing downstream ever touches raw
//! JSON. The backend derives its payloads from CSV rows and ships numbers as
//! strings, so every metric field is decoded leniently: numbers pass through,
//! numeric strings are parsed, anything else becomes `0.0`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::data::SeriesPoint;
use crate::error::DecodeError;

/// Metric column order for the real-time window.
///
/// Must match the value order produced by [`RawSample::to_point`].
pub const REALTIME_METRICS: &[&str] = &["cpu_percent", "threads", "handles", "memory_mb"];

/// Metric column order for the trend window.
///
/// Must match the value order produced by [`TrendPoint::to_point`].
pub const TREND_METRICS: &[&str] = &["avg_memory", "avg_threads", "avg_handles"];

/// Outbound command envelope, `{"type": ..., "data": {...}}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Command {
    Configure { exe: String, interval: u32, limit: u32 },
    Start,
    Stop,
    TradeUpdate,
    TradeStart,
    TradeStop,
}

/// One real-time sample as pushed by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSample {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cpu_percent: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub threads: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub handles: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub memory_mb: f64,
}

impl RawSample {
    /// Convert to a series point, or `None` when the timestamp has no
    /// extractable time-of-day component (the sample is then dropped).
    pub fn to_point(&self) -> Option<SeriesPoint> {
        let label = time_label(&self.timestamp)?;
        Some(SeriesPoint {
            label: label.to_string(),
            values: vec![self.cpu_percent, self.threads, self.handles, self.memory_mb],
        })
    }
}

/// One aggregated trend point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrendPoint {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_memory: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_threads: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_handles: f64,
}

impl TrendPoint {
    pub fn to_point(&self) -> Option<SeriesPoint> {
        let label = time_label(&self.timestamp)?;
        Some(SeriesPoint {
            label: label.to_string(),
            values: vec![self.avg_memory, self.avg_threads, self.avg_handles],
        })
    }
}

/// Trend payload: the server pushes historical backfill as a batch and live
/// points individually. Decoded explicitly here rather than shape-sniffed
/// downstream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TrendPayload {
    Batch(Vec<TrendPoint>),
    Single(TrendPoint),
}

impl TrendPayload {
    pub fn points(&self) -> &[TrendPoint] {
        match self {
            TrendPayload::Batch(points) => points,
            TrendPayload::Single(point) => std::slice::from_ref(point),
        }
    }
}

/// Backend status line. `success` is structured on current backends; older
/// ones send only the message text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusLog {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: String,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Realtime(RawSample),
    TrendPush(TrendPayload),
    HistoryTrend(TrendPayload),
    StatusLog(StatusLog),
}

/// Decode one inbound frame.
///
/// `Ok(None)` means the type tag is valid JSON but unknown to this client —
/// protocol drift, ignored by the dispatcher rather than treated as an error.
pub fn decode(raw: &str) -> Result<Option<Inbound>, DecodeError> {
    let json: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::Json(e.to_string()))?;
    let kind = json
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;

    match kind {
        "realtime" => serde_json::from_value(data_field(&json))
            .map(|s| Some(Inbound::Realtime(s)))
            .map_err(|e| payload_error("realtime", e)),
        "trend_push" => serde_json::from_value(data_field(&json))
            .map(|p| Some(Inbound::TrendPush(p)))
            .map_err(|e| payload_error("trend_push", e)),
        "history_trend" => serde_json::from_value(data_field(&json))
            .map(|p| Some(Inbound::HistoryTrend(p)))
            .map_err(|e| payload_error("history_trend", e)),
        // status frames carry their fields at the top level, not under "data"
        "status_log" => serde_json::from_value(json.clone())
            .map(|s| Some(Inbound::StatusLog(s)))
            .map_err(|e| payload_error("status_log", e)),
        _ => Ok(None),
    }
}

fn data_field(json: &Value) -> Value {
    json.get("data").cloned().unwrap_or(Value::Null)
}

fn payload_error(kind: &'static str, e: serde_json::Error) -> DecodeError {
    DecodeError::Payload {
        kind,
        detail: e.to_string(),
    }
}

/// Extract the time-of-day component of a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn time_label(timestamp: &str) -> Option<&str> {
    timestamp.split_whitespace().nth(1)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}
