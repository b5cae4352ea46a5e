use harrier_io::{render, IoRecord};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The error that made a process end fatally, shared by every observer of the exit state.
pub type Cause = Arc<anyhow::Error>;

/// A textual snapshot of a process's I/O, optionally persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dump {
	text: String,
	path: Option<PathBuf>,
}

impl Dump {
	pub fn new(text: impl Into<String>) -> Self {
		Self { text: text.into(), path: None }
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	/// Where the dump was written, if it was persisted.
	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub(crate) fn for_failure(exit_code: i32, pid: u32, io: &[IoRecord]) -> Self {
		Self::new(render_dump(&failure_status(pid, exit_code), None, io))
	}

	pub(crate) fn persisted_at(mut self, path: PathBuf) -> Self {
		self.path = Some(path);
		self
	}
}

/// The closed set of terminal outcomes a process resolves to, exactly once.
#[derive(Debug, Clone)]
pub enum ExitState {
	Success { pid: u32, exit_code: i32, io: Vec<IoRecord> },
	Failure { exit_code: i32, pid: u32, io: Vec<IoRecord>, dump: Option<Dump> },
	Fatal { cause: Cause, exit_code: i32, pid: u32, io: Vec<IoRecord>, dump: Dump },
}

impl ExitState {
	pub fn success(pid: u32, io: Vec<IoRecord>) -> Self {
		ExitState::Success { pid, exit_code: 0, io }
	}

	/// A failure without a dump; one is generated during resolution.
	pub fn failure(exit_code: i32, pid: u32, io: Vec<IoRecord>) -> Self {
		ExitState::Failure { exit_code, pid, io, dump: None }
	}

	/// A fatal outcome. The dump is rendered right away and persisted during resolution.
	pub fn fatal(cause: anyhow::Error, exit_code: i32, pid: u32, io: Vec<IoRecord>) -> Self {
		let cause = Arc::new(cause);
		let dump = Dump::new(render_dump(&fatal_status(pid, exit_code, &cause), Some(&*cause), &io));
		ExitState::Fatal { cause, exit_code, pid, io, dump }
	}

	pub fn successful(&self) -> bool {
		matches!(self, ExitState::Success { .. })
	}

	pub fn pid(&self) -> u32 {
		match self {
			ExitState::Success { pid, .. }
			| ExitState::Failure { pid, .. }
			| ExitState::Fatal { pid, .. } => *pid,
		}
	}

	pub fn exit_code(&self) -> i32 {
		match self {
			ExitState::Success { exit_code, .. }
			| ExitState::Failure { exit_code, .. }
			| ExitState::Fatal { exit_code, .. } => *exit_code,
		}
	}

	/// Every record observed until termination.
	pub fn io(&self) -> &[IoRecord] {
		match self {
			ExitState::Success { io, .. }
			| ExitState::Failure { io, .. }
			| ExitState::Fatal { io, .. } => io,
		}
	}

	pub fn dump(&self) -> Option<&Dump> {
		match self {
			ExitState::Success { .. } => None,
			ExitState::Failure { dump, .. } => dump.as_ref(),
			ExitState::Fatal { dump, .. } => Some(dump),
		}
	}

	pub fn cause(&self) -> Option<&Cause> {
		match self {
			ExitState::Fatal { cause, .. } => Some(cause),
			ExitState::Success { .. } | ExitState::Failure { .. } => None,
		}
	}

	/// A one line, human readable description of the outcome.
	pub fn status(&self) -> String {
		match self {
			ExitState::Success { pid, .. } => format!("Process {pid} terminated successfully."),
			ExitState::Failure { exit_code, pid, .. } => failure_status(*pid, *exit_code),
			ExitState::Fatal { cause, exit_code, pid, .. } => fatal_status(*pid, *exit_code, cause),
		}
	}

	/// The multi-line diagnostic text for this state.
	pub fn render_dump(&self) -> String {
		render_dump(&self.status(), self.cause().map(|cause| &**cause), self.io())
	}
}

impl fmt::Display for ExitState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.status())
	}
}

fn failure_status(pid: u32, exit_code: i32) -> String {
	format!("Process {pid} terminated with exit code {exit_code}.")
}

fn fatal_status(pid: u32, exit_code: i32, cause: &anyhow::Error) -> String {
	format!("Process {pid} terminated fatally with exit code {exit_code}: {cause}")
}

fn render_dump(status: &str, cause: Option<&anyhow::Error>, io: &[IoRecord]) -> String {
	let mut text = String::from(status);
	text.push('\n');
	if let Some(cause) = cause {
		text.push_str(&format!("Cause: {cause:#}\n"));
	}
	text.push_str("--- io ---\n");
	text.push_str(&render(io));
	text.push('\n');
	text
}

/// Where a process is in its lifecycle.
#[derive(Debug, Clone)]
pub enum ProcessState {
	Prepared,
	Running { pid: u32 },
	Terminated(Arc<ExitState>),
}

impl ProcessState {
	/// `None` until the process has terminated.
	pub fn successful(&self) -> Option<bool> {
		match self {
			ProcessState::Terminated(exit) => Some(exit.successful()),
			ProcessState::Prepared | ProcessState::Running { .. } => None,
		}
	}

	pub fn pid(&self) -> Option<u32> {
		match self {
			ProcessState::Prepared => None,
			ProcessState::Running { pid } => Some(*pid),
			ProcessState::Terminated(exit) => Some(exit.pid()),
		}
	}

	pub fn is_terminated(&self) -> bool {
		matches!(self, ProcessState::Terminated(_))
	}

	pub fn status(&self) -> String {
		match self {
			ProcessState::Prepared => "Process has not been started yet.".to_string(),
			ProcessState::Running { pid } => format!("Process {pid} is running."),
			ProcessState::Terminated(exit) => exit.status(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_in_every_variant() {
		let io = vec![IoRecord::Output("out".to_string())];
		assert_eq!(ExitState::success(1, io.clone()).status(), "Process 1 terminated successfully.");
		assert_eq!(
			ExitState::failure(7, 2, io.clone()).status(),
			"Process 2 terminated with exit code 7."
		);
		assert_eq!(
			ExitState::fatal(anyhow::anyhow!("broken"), 0, 3, io).status(),
			"Process 3 terminated fatally with exit code 0: broken"
		);
	}

	#[test]
	fn test_fatal_dump_reproduces_io_and_cause_chain() {
		let cause = anyhow::anyhow!("pipe vanished").context("failed to consume output");
		let io = vec![IoRecord::Output("a".to_string()), IoRecord::Error("b".to_string())];
		let fatal = ExitState::fatal(cause, 1, 42, io);

		let dump = fatal.dump().map(Dump::text).unwrap_or_default();
		assert!(dump.starts_with("Process 42 terminated fatally"));
		assert!(dump.contains("Cause: failed to consume output: pipe vanished"));
		assert!(dump.ends_with("--- io ---\na\nb\n"));
		assert!(!fatal.successful());
	}

	#[test]
	fn test_successful_only_after_termination() {
		assert_eq!(ProcessState::Prepared.successful(), None);
		assert_eq!(ProcessState::Running { pid: 9 }.successful(), None);
		let terminated = ProcessState::Terminated(Arc::new(ExitState::failure(1, 9, Vec::new())));
		assert_eq!(terminated.successful(), Some(false));
		assert_eq!(terminated.pid(), Some(9));
	}
}
