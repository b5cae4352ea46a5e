//! Logging setup using `tracing` + `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `harrier_process=debug`.
pub const HARRIER_LOG: &str = "HARRIER_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
	#[error("failed to install global subscriber: {0}")]
	Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Installs a global subscriber writing to stderr, filtered by [HARRIER_LOG].
///
/// Fails if a global subscriber is already installed.
pub fn init() -> Result<(), LoggingError> {
	tracing_subscriber::fmt()
		.with_env_filter(filter(std::env::var(HARRIER_LOG).ok().as_deref()))
		.with_writer(std::io::stderr)
		.with_target(true)
		.try_init()
		.map_err(LoggingError::Install)
}

/// Invalid directives fall back to `info`.
fn filter(directives: Option<&str>) -> EnvFilter {
	directives
		.and_then(|directives| EnvFilter::try_new(directives).ok())
		.unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}
