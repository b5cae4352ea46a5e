//! In-memory stand-ins for a spawned child.

use crate::lock;
use crate::process::{ChildControl, Launch, Launched, OutputChannel};
use commander::CommandError;
use futures::future::BoxFuture;
use harrier_state::State;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, DuplexStream, ReadBuf};

/// A channel that fails on every read.
pub(crate) struct Broken;

impl AsyncRead for Broken {
	fn poll_read(
		self: Pin<&mut Self>,
		_cx: &mut Context<'_>,
		_buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		Poll::Ready(Err(io::Error::other("boom")))
	}
}

/// A child that exits when told to. Its open pipes close on exit.
pub(crate) struct FakeChild {
	pid: u32,
	exit: State<i32>,
	killed: AtomicBool,
	pipes: Mutex<Vec<DuplexStream>>,
}

impl FakeChild {
	pub(crate) fn new(pid: u32) -> Self {
		Self { pid, exit: State::new(), killed: AtomicBool::new(false), pipes: Mutex::new(Vec::new()) }
	}

	/// Returns the read end of a pipe that stays open until the child exits.
	pub(crate) fn pipe(&self) -> OutputChannel {
		let (writer, reader) = tokio::io::duplex(1024);
		lock(&self.pipes).push(writer);
		Box::pin(reader)
	}

	pub(crate) fn finish(&self, code: i32) {
		// A second exit is ignored, like a signal sent to a reaped child.
		if self.exit.write().try_set(code).is_ok() {
			lock(&self.pipes).clear();
		}
	}

	pub(crate) fn was_killed(&self) -> bool {
		self.killed.load(Ordering::SeqCst)
	}
}

impl ChildControl for FakeChild {
	fn pid(&self) -> u32 {
		self.pid
	}

	fn wait(&self) -> BoxFuture<'_, io::Result<()>> {
		Box::pin(async move {
			self.exit.read().wait_forever().await;
			Ok(())
		})
	}

	fn exit_code(&self) -> Option<i32> {
		self.exit.read().get()
	}

	fn stop(&self) -> Result<(), CommandError> {
		self.finish(143);
		Ok(())
	}

	fn kill(&self) -> Result<(), CommandError> {
		self.killed.store(true, Ordering::SeqCst);
		self.finish(137);
		Ok(())
	}
}

/// Hands out a prepared set of channels once.
pub(crate) struct FakeLaunch {
	launched: Option<Launched>,
}

impl FakeLaunch {
	pub(crate) fn new(output: OutputChannel, error: OutputChannel, child: Arc<FakeChild>) -> Self {
		Self {
			launched: Some(Launched {
				input: Box::pin(tokio::io::sink()),
				output,
				error,
				control: child,
			}),
		}
	}

	/// A child that already wrote everything and exited with `code`.
	pub(crate) fn finished(
		pid: u32,
		output: &[u8],
		error: &[u8],
		code: i32,
	) -> (Self, Arc<FakeChild>) {
		let child = Arc::new(FakeChild::new(pid));
		child.finish(code);
		let output = Box::pin(io::Cursor::new(output.to_vec()));
		let error = Box::pin(io::Cursor::new(error.to_vec()));
		(Self::new(output, error, child.clone()), child)
	}

	/// A silent child that runs until finished or signalled.
	pub(crate) fn pending(pid: u32) -> (Self, Arc<FakeChild>) {
		let child = Arc::new(FakeChild::new(pid));
		(Self::new(child.pipe(), child.pipe(), child.clone()), child)
	}

	/// Like [FakeLaunch::pending], also returning the read end of the child's input.
	pub(crate) fn with_input(pid: u32) -> (Self, Arc<FakeChild>, DuplexStream) {
		let (mut launch, child) = Self::pending(pid);
		let (writer, reader) = tokio::io::duplex(1024);
		if let Some(launched) = launch.launched.as_mut() {
			launched.input = Box::pin(writer);
		}
		(launch, child, reader)
	}

	pub(crate) fn failing() -> Self {
		Self { launched: None }
	}
}

impl Launch for FakeLaunch {
	fn launch(&mut self) -> Result<Launched, CommandError> {
		self.launched.take().ok_or_else(|| CommandError::Spawn {
			program: "fake".to_string(),
			source: io::Error::new(io::ErrorKind::NotFound, "no channels left"),
		})
	}

	fn working_dir(&self) -> Option<PathBuf> {
		None
	}

	fn describe(&self) -> String {
		"fake".to_string()
	}
}
