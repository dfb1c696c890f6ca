//! Logging setup
//!
//! Diagnostics go to stderr through `tracing`; stdout is reserved for
//! results so `--output json` stays machine-readable.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Crates whose events are shown.
const CRATES: [&str; 3] = ["apiprobe", "apiprobe_runner", "apiprobe_core"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// `apiprobe=info,apiprobe_runner=info,...`
    pub fn directive(self) -> String {
        let level = self.to_tracing_level().as_str().to_ascii_lowercase();
        CRATES
            .iter()
            .map(|c| format!("{c}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over `level`.
pub fn init_logger(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    // A subscriber may already be set (tests); keep the existing one
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
