//! Platform-agnostic session core: series stores, protocol, state machine.

pub mod data;
pub mod protocol;
pub mod session;

pub use data::{MetricColumn, MetricSeries, SeriesPoint, TrendSeries};
pub use protocol::{decode, Command, Inbound, RawSample, StatusLog, TrendPayload, TrendPoint};
pub use session::{CommandTransport, Session, SessionPhase, StatusLine};
