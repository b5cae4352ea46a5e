use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DUMP_DIR: &str = "HARRIER_DUMP_DIR";
pub const DUMP_ON_FAILURE: &str = "HARRIER_DUMP_ON_FAILURE";
pub const IDLE_FLUSH_MS: &str = "HARRIER_IDLE_FLUSH_MS";
pub const READ_BUFFER_SIZE: &str = "HARRIER_READ_BUFFER_SIZE";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid value {value:?} for {key}")]
	Invalid { key: &'static str, value: String },

	#[error("failed to parse config: {0}")]
	Json(#[from] serde_json::Error),
}

/// Tunables shared by every process started with this configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
	/// Where dumps are written. Falls back to the command's working directory, then to the
	/// current directory.
	pub dump_dir: Option<PathBuf>,
	/// Persist a dump file for `Failure` states. `Fatal` states are always dumped.
	pub dump_on_failure: bool,
	/// How long a non-blocking interactive channel may stay silent before a pending fragment
	/// is delivered as a line.
	pub idle_flush_ms: u64,
	/// Size of the chunks read from the output and error channels.
	pub read_buffer_size: usize,
}

impl Default for ProcessConfig {
	fn default() -> Self {
		Self { dump_dir: None, dump_on_failure: true, idle_flush_ms: 100, read_buffer_size: 8192 }
	}
}

impl ProcessConfig {
	/// Reads the configuration from `HARRIER_*` environment variables, using defaults for the
	/// ones that are not set.
	pub fn from_env() -> Result<Self, ConfigError> {
		let defaults = Self::default();
		Ok(Self {
			dump_dir: std::env::var_os(DUMP_DIR).map(PathBuf::from).or(defaults.dump_dir),
			dump_on_failure: parse_var(DUMP_ON_FAILURE)?.unwrap_or(defaults.dump_on_failure),
			idle_flush_ms: parse_var(IDLE_FLUSH_MS)?.unwrap_or(defaults.idle_flush_ms),
			read_buffer_size: parse_var::<usize>(READ_BUFFER_SIZE)?
				.filter(|size| *size > 0)
				.unwrap_or(defaults.read_buffer_size),
		})
	}

	/// Parses a JSON document; missing fields take their defaults.
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn idle_flush(&self) -> Duration {
		Duration::from_millis(self.idle_flush_ms)
	}

	pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.dump_dir = Some(dir.into());
		self
	}
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
	match std::env::var(key) {
		Ok(value) => value
			.trim()
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::Invalid { key, value }),
		Err(_) => Ok(None),
	}
}
