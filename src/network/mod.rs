//! Network subsystem for the ADTS stream

pub mod sink;
pub mod stats;

pub use sink::NetworkSink;
pub use stats::{Clock, ManualClock, StreamStats, SystemClock};
