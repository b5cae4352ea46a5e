use crate::config::ProcessConfig;
use crate::exit::{Dump, ExitState};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Places and persists the dumps of unsuccessful exit states.
#[derive(Debug, Clone)]
pub(crate) struct DumpTarget {
	dir: PathBuf,
	on_failure: bool,
}

impl DumpTarget {
	/// The configured dump directory, else the working directory, else the current directory.
	pub(crate) fn new(config: &ProcessConfig, working_dir: Option<&Path>) -> Self {
		let dir = config
			.dump_dir
			.clone()
			.or_else(|| working_dir.map(Path::to_path_buf))
			.or_else(|| std::env::current_dir().ok())
			.unwrap_or_else(|| PathBuf::from("."));
		Self { dir, on_failure: config.dump_on_failure }
	}

	pub(crate) fn path_for(&self, pid: u32) -> PathBuf {
		self.dir.join(format!("harrier.{pid}.dump.log"))
	}

	/// Generates missing dumps and writes them to disk. `Fatal` dumps are always written.
	pub(crate) async fn complete(&self, state: ExitState) -> ExitState {
		match state {
			ExitState::Success { .. } => state,
			ExitState::Failure { exit_code, pid, io, dump } => {
				let dump = dump.unwrap_or_else(|| Dump::for_failure(exit_code, pid, &io));
				let dump = if self.on_failure { self.persist(pid, dump).await } else { dump };
				ExitState::Failure { exit_code, pid, io, dump: Some(dump) }
			}
			ExitState::Fatal { cause, exit_code, pid, io, dump } => {
				let dump = self.persist(pid, dump).await;
				ExitState::Fatal { cause, exit_code, pid, io, dump }
			}
		}
	}

	async fn persist(&self, pid: u32, dump: Dump) -> Dump {
		let path = self.path_for(pid);
		let written = match tokio::fs::create_dir_all(&self.dir).await {
			Ok(()) => tokio::fs::write(&path, dump.text()).await,
			Err(e) => Err(e),
		};
		match written {
			Ok(()) => {
				info!(pid, "wrote dump to {}", path.display());
				dump.persisted_at(path)
			}
			Err(e) => {
				warn!(pid, "failed to write dump to {}: {e}", path.display());
				dump
			}
		}
	}
}
