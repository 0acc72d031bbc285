//! Logging and frame timing
//!
//! Log records go to the terminal through env_logger; records from this crate
//! are also forwarded to the UI status bar.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, UiLogRecord};
pub use metrics::{FrameRateCounter, LatencyTracker};
