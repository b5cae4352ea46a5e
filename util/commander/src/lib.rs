use itertools::Itertools;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command as InnerCommand};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Errors raised while spawning or signalling a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
	#[error("failed to spawn {program}: {source}")]
	Spawn {
		program: String,
		#[source]
		source: io::Error,
	},

	#[error("failed to capture standard {0} of command {1}")]
	Pipe(&'static str, String),

	#[error("failed to signal process {pid}: {source}")]
	Signal {
		pid: u32,
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},
}

/// Builder for running commands
///
/// Tokenization and quoting are the caller's business: the program and every argument are
/// passed to the operating system as given.
#[derive(Debug)]
pub struct Command {
	inner: InnerCommand,
}

impl Command {
	pub fn line<C, I, S>(command: C, args: I, working_dir: Option<&Path>) -> Self
	where
		C: AsRef<OsStr>,
		I: IntoIterator<Item = S>,
		S: AsRef<OsStr>,
	{
		let mut command = Command::new(command);
		command.args(args);
		if let Some(dir) = working_dir {
			command.current_dir(dir);
		}
		command
	}

	pub fn new(program: impl AsRef<OsStr>) -> Self {
		let mut inner = InnerCommand::new(program);
		inner.kill_on_drop(true);
		Self { inner }
	}

	pub fn arg<S>(&mut self, arg: S) -> &mut Self
	where
		S: AsRef<OsStr>,
	{
		self.inner.arg(arg);
		self
	}

	pub fn args<I, S>(&mut self, args: I) -> &mut Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<OsStr>,
	{
		self.inner.args(args);
		self
	}

	pub fn env<K, V>(&mut self, key: K, value: V) -> &mut Self
	where
		K: AsRef<OsStr>,
		V: AsRef<OsStr>,
	{
		self.inner.env(key, value);
		self
	}

	pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<OsStr>,
		V: AsRef<OsStr>,
	{
		self.inner.envs(vars);
		self
	}

	pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
		self.inner.current_dir(dir);
		self
	}

	/// The working directory the command will run in, if one was set.
	pub fn working_dir(&self) -> Option<PathBuf> {
		self.inner.as_std().get_current_dir().map(Path::to_path_buf)
	}

	/// The program followed by its arguments, space separated.
	pub fn display(&self) -> String {
		let std = self.inner.as_std();
		std::iter::once(std.get_program())
			.chain(std.get_args())
			.map(|s| s.to_string_lossy())
			.join(" ")
	}

	/// Spawns the command with all three standard streams piped.
	pub fn spawn(&mut self) -> Result<Spawned, CommandError> {
		let cmd_display = self.display();
		let working_dir = self
			.working_dir()
			.map(|p| p.to_string_lossy().into_owned())
			.unwrap_or_else(|| "default".to_string());

		info!("Running command: {cmd_display} in {working_dir}");

		let mut child = self
			.inner
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|source| CommandError::Spawn { program: cmd_display.clone(), source })?;

		let pid = child.id().ok_or_else(|| CommandError::Spawn {
			program: cmd_display.clone(),
			source: io::Error::new(io::ErrorKind::Other, "process exited before its pid was read"),
		})?;
		let stdin = child.stdin.take().ok_or_else(|| CommandError::Pipe("input", cmd_display.clone()))?;
		let stdout =
			child.stdout.take().ok_or_else(|| CommandError::Pipe("output", cmd_display.clone()))?;
		let stderr = child.stderr.take().ok_or_else(|| CommandError::Pipe("error", cmd_display))?;

		debug!(pid, "spawned child process");

		Ok(Spawned {
			stdin,
			stdout,
			stderr,
			child: Child { pid, inner: Mutex::new(child), status: OnceLock::new() },
		})
	}
}

/// A freshly spawned command: its three pipes and the child handle.
#[derive(Debug)]
pub struct Spawned {
	pub stdin: ChildStdin,
	pub stdout: ChildStdout,
	pub stderr: ChildStderr,
	pub child: Child,
}

/// A spawned child process that can be awaited and signalled concurrently.
#[derive(Debug)]
pub struct Child {
	pid: u32,
	inner: Mutex<tokio::process::Child>,
	status: OnceLock<ExitStatus>,
}

impl Child {
	pub fn pid(&self) -> u32 {
		self.pid
	}

	/// Waits for the child to exit. Repeated calls return the cached status.
	pub async fn wait(&self) -> io::Result<ExitStatus> {
		if let Some(status) = self.status.get() {
			return Ok(*status);
		}
		let mut child = self.inner.lock().await;
		let status = child.wait().await?;
		Ok(*self.status.get_or_init(|| status))
	}

	/// The exit status once the child has been awaited.
	pub fn exit_status(&self) -> Option<ExitStatus> {
		self.status.get().copied()
	}

	/// Requests graceful termination.
	pub fn terminate(&self) -> Result<(), CommandError> {
		self.signal(Termination::Graceful)
	}

	/// Requests forceful termination.
	pub fn kill(&self) -> Result<(), CommandError> {
		self.signal(Termination::Forceful)
	}

	fn signal(&self, termination: Termination) -> Result<(), CommandError> {
		// The pid may already be reused once the child was reaped.
		if self.status.get().is_some() {
			return Ok(());
		}
		debug!(pid = self.pid, ?termination, "signalling child process");
		send(self, termination)
	}
}

#[derive(Debug, Clone, Copy)]
enum Termination {
	Graceful,
	Forceful,
}

#[cfg(unix)]
fn send(child: &Child, termination: Termination) -> Result<(), CommandError> {
	use nix::errno::Errno;
	use nix::sys::signal::{kill, Signal};
	use nix::unistd::Pid;

	let signal = match termination {
		Termination::Graceful => Signal::SIGTERM,
		Termination::Forceful => Signal::SIGKILL,
	};
	let pid = Pid::from_raw(i32::try_from(child.pid).unwrap_or(i32::MAX));
	match kill(pid, signal) {
		Ok(()) | Err(Errno::ESRCH) => Ok(()),
		Err(e) => Err(CommandError::Signal { pid: child.pid, source: Box::new(e) }),
	}
}

#[cfg(not(unix))]
fn send(child: &Child, _termination: Termination) -> Result<(), CommandError> {
	match child.inner.try_lock() {
		Ok(mut inner) => inner
			.start_kill()
			.map_err(|e| CommandError::Signal { pid: child.pid, source: Box::new(e) }),
		Err(e) => Err(CommandError::Signal { pid: child.pid, source: Box::new(e) }),
	}
}

/// Maps an exit status to a numeric exit code.
///
/// On Unix a signal-terminated process reports `128 + signal`, the convention shells use.
pub fn exit_code(status: ExitStatus) -> i32 {
	if let Some(code) = status.code() {
		return code;
	}
	#[cfg(unix)]
	{
		use std::os::unix::process::ExitStatusExt;
		if let Some(signal) = status.signal() {
			return 128 + signal;
		}
	}
	-1
}
