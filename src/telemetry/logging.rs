//! Logging configuration and initialization

use crossbeam_channel::{Receiver, Sender};
use log::{Level, Log, Metadata, Record};

/// Target prefix of records emitted by this crate
const CRATE_TARGET: &str = "live_face_swap";

/// A log record forwarded to the UI
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UiLogRecord {
    pub level: Level,
    pub message: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Environment variable checked before `RUST_LOG`
    pub env_var: &'static str,
    /// Filter used when neither variable is set (default: "info")
    pub default_level: String,
    /// Records buffered for the UI before new ones are dropped
    pub ui_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            env_var: "FACE_SWAP_LOG",
            default_level: "info".to_string(),
            ui_capacity: 256,
        }
    }
}

impl LogConfig {
    /// Filter string from `env_var`, then `RUST_LOG`, then `default_level`
    pub fn filter(&self) -> String {
        std::env::var(self.env_var)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| self.default_level.clone())
    }
}

/// env_logger wrapper that also forwards this crate's records to the UI
struct ForwardingLogger {
    inner: env_logger::Logger,
    sender: Sender<UiLogRecord>,
}

impl ForwardingLogger {
    fn forwards(record: &Record) -> bool {
        record.level() <= Level::Info && record.target().starts_with(CRATE_TARGET)
    }
}

impl Log for ForwardingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.inner.matches(record) {
            return;
        }
        self.inner.log(record);

        if Self::forwards(record) {
            let forwarded = UiLogRecord {
                level: record.level(),
                message: record.args().to_string(),
            };
            // Dropped when the UI is not keeping up
            let _ = self.sender.try_send(forwarded);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the global logger
///
/// Returns the receiving end of the UI channel. Fails if a logger is already set.
pub fn init_logging(config: &LogConfig) -> Result<Receiver<UiLogRecord>, log::SetLoggerError> {
    let filter = config.filter();
    let inner = env_logger::Builder::new().parse_filters(&filter).build();
    let max_level = inner.filter();

    let (sender, receiver) = crossbeam_channel::bounded(config.ui_capacity.max(1));
    log::set_boxed_logger(Box::new(ForwardingLogger { inner, sender }))?;
    log::set_max_level(max_level);

    log::info!(
        "{} v{} logging initialized ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        filter
    );
    Ok(receiver)
}
