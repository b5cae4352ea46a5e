use crate::process::{ChildControl, Launch, Launched};
use commander::{Child, Command as InnerCommand, CommandError};
use futures::future::BoxFuture;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runs a program on the command line with all standard streams piped.
#[derive(Debug)]
pub struct Command {
	inner: InnerCommand,
}

impl Command {
	/// Create a new Command instance from a program, its arguments and a working directory.
	pub fn line<C, I, S>(command: C, args: I, working_dir: Option<&Path>) -> Self
	where
		C: AsRef<OsStr>,
		I: IntoIterator<Item = S>,
		S: AsRef<OsStr>,
	{
		Self { inner: InnerCommand::line(command, args, working_dir) }
	}

	pub fn new(program: impl AsRef<OsStr>) -> Self {
		Self { inner: InnerCommand::new(program) }
	}

	/// Access to the underlying builder, for environment and argument tweaks.
	pub fn inner_mut(&mut self) -> &mut InnerCommand {
		&mut self.inner
	}
}

impl From<InnerCommand> for Command {
	fn from(inner: InnerCommand) -> Self {
		Self { inner }
	}
}

impl Launch for Command {
	fn launch(&mut self) -> Result<Launched, CommandError> {
		let spawned = self.inner.spawn()?;
		Ok(Launched {
			input: Box::pin(spawned.stdin),
			output: Box::pin(spawned.stdout),
			error: Box::pin(spawned.stderr),
			control: Arc::new(spawned.child),
		})
	}

	fn working_dir(&self) -> Option<PathBuf> {
		self.inner.working_dir()
	}

	fn describe(&self) -> String {
		self.inner.display()
	}
}

impl ChildControl for Child {
	fn pid(&self) -> u32 {
		Child::pid(self)
	}

	fn wait(&self) -> BoxFuture<'_, io::Result<()>> {
		Box::pin(async move { Child::wait(self).await.map(|_| ()) })
	}

	fn exit_code(&self) -> Option<i32> {
		self.exit_status().map(commander::exit_code)
	}

	fn stop(&self) -> Result<(), CommandError> {
		self.terminate()
	}

	fn kill(&self) -> Result<(), CommandError> {
		Child::kill(self)
	}
}
