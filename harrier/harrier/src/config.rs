use harrier_process::{ConfigError, ProcessConfig};
use tracing::{debug, warn};

/// Loads a `.env` file when present, then reads the process configuration from the environment.
pub fn load() -> Result<ProcessConfig, ConfigError> {
	match dotenv::dotenv() {
		Ok(path) => debug!("loaded environment from {}", path.display()),
		Err(e) if e.not_found() => {}
		Err(e) => warn!("failed to load .env file: {e}"),
	}
	ProcessConfig::from_env()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_load_without_env_file_uses_defaults() -> Result<(), ConfigError> {
		let config = load()?;
		assert_eq!(config.read_buffer_size, ProcessConfig::default().read_buffer_size);
		Ok(())
	}
}
