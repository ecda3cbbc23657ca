mod dispatcher;
mod history;
mod sink;

use serde::Serialize;

pub use dispatcher::AlertDispatcher;
pub use history::AlertHistory;
pub use sink::{AlertSink, CommandSink, LogSink};

/// One accepted detection, as handed to every sink.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub id: u64,
    pub frame: u64,
    /// Unix epoch milliseconds.
    pub timestamp_ms: u64,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub area: f64,
    pub speed: f64,
}
