use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logging options handed to the transport at construction time.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingConfig {
    /// Log every outbound request and its response at debug level.
    /// Header values are never logged.
    pub debug_requests: bool,
}

impl LoggingConfig {
    pub fn from_config(config: &crate::SinkConfig) -> Self {
        Self {
            debug_requests: config.debug_requests,
        }
    }
}

/// Initialize the tracing subscriber.
/// Uses RUST_LOG env var for filtering (defaults to info). Output goes to
/// stderr; stdout belongs to the pipeline.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_writer(std::io::stderr))
            .init();
    }
}
