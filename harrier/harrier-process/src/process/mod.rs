pub mod command;

use commander::CommandError;
use futures::future::BoxFuture;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// The writable end of a process's standard input.
pub type InputChannel = Pin<Box<dyn AsyncWrite + Send>>;

/// A readable process channel, standard output or standard error.
pub type OutputChannel = Pin<Box<dyn AsyncRead + Send>>;

/// Control over a running child, shared by the handle, the exit watcher and the registry.
pub trait ChildControl: Send + Sync + 'static {
	fn pid(&self) -> u32;

	/// Resolves once the child has exited.
	fn wait(&self) -> BoxFuture<'_, io::Result<()>>;

	/// The exit code, valid once [ChildControl::wait] has resolved.
	fn exit_code(&self) -> Option<i32>;

	/// Requests graceful termination without blocking.
	fn stop(&self) -> Result<(), CommandError>;

	/// Requests forceful termination without blocking.
	fn kill(&self) -> Result<(), CommandError>;
}

/// Everything a successful launch hands over.
pub struct Launched {
	pub input: InputChannel,
	pub output: OutputChannel,
	pub error: OutputChannel,
	pub control: Arc<dyn ChildControl>,
}

/// Spawns the program behind a [crate::Process].
///
/// Implementations receive an already resolved program, arguments, environment and working
/// directory; no tokenization happens at this layer.
pub trait Launch: Send + 'static {
	/// Spawns the program. Called within the process's scheduler context.
	fn launch(&mut self) -> Result<Launched, CommandError>;

	/// The working directory, used to place dump files.
	fn working_dir(&self) -> Option<PathBuf>;

	/// A human readable rendition of what is launched.
	fn describe(&self) -> String;
}
