//! Structured logging initialization.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::schema::LoggingConfig;

/// Error type for logging setup.
#[derive(Debug)]
pub enum LoggingError {
    Io(std::io::Error),
    Init(String),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::Io(e) => write!(f, "failed to open log output: {}", e),
            LoggingError::Init(e) => write!(f, "failed to initialize logging: {}", e),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Initialize the global tracing subscriber from config.
///
/// `RUST_LOG` overrides the configured level when set. Must be called at
/// most once per process.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let writer = match config.output.as_str() {
        "stdout" => BoxMakeWriter::new(std::io::stdout),
        "stderr" => BoxMakeWriter::new(std::io::stderr),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(LoggingError::Io)?;
            BoxMakeWriter::new(Arc::new(file))
        }
    };

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_target(true),
            )
            .try_init()
    };

    result.map_err(|e| LoggingError::Init(e.to_string()))
}
