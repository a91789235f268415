//! Alert types and the Alert Manager (spec §4.4, §6).

mod manager;
mod sinks;
mod types;

pub use manager::{AlertManager, AlertManagerStats, RoutingTable, SeverityRouting};
pub use sinks::{AlertSink, ConsoleSink, JsonLogSink, TextLogSink};
pub use types::{Alert, AlertType, Severity};
