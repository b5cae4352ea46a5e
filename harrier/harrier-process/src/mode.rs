use std::fmt;
use tokio::io::AsyncRead;

/// Bytes to forward into a non-interactive process's input channel.
pub type InputSource = Box<dyn AsyncRead + Send + Unpin>;

/// Whether dispatch runs on the caller's task or on the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Synchronicity {
	#[default]
	Sync,
	Async,
}

pub enum Interactivity {
	/// The caller keeps the input channel, see [crate::Process::take_input].
	///
	/// With `non_blocking` set, an unterminated fragment such as a prompt is delivered once the
	/// channel has been idle for the configured interval.
	Interactive { non_blocking: bool },
	/// The input channel is fed from the optional source, then closed.
	NonInteractive(Option<InputSource>),
}

impl Default for Interactivity {
	fn default() -> Self {
		Interactivity::NonInteractive(None)
	}
}

impl fmt::Debug for Interactivity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Interactivity::Interactive { non_blocking } => {
				f.debug_struct("Interactive").field("non_blocking", non_blocking).finish()
			}
			Interactivity::NonInteractive(source) => f
				.debug_tuple("NonInteractive")
				.field(&source.as_ref().map(|_| "InputSource"))
				.finish(),
		}
	}
}

/// How a started process's channels are consumed. Chosen once per execution.
#[derive(Debug, Default)]
pub struct ProcessingMode {
	pub synchronicity: Synchronicity,
	pub interactivity: Interactivity,
}

impl ProcessingMode {
	/// Synchronous and non-interactive, the default.
	pub fn synchronous() -> Self {
		Self::default()
	}

	pub fn asynchronous() -> Self {
		Self { synchronicity: Synchronicity::Async, ..Self::default() }
	}

	pub fn interactive(mut self, non_blocking: bool) -> Self {
		self.interactivity = Interactivity::Interactive { non_blocking };
		self
	}

	/// Feeds the given source into the process's input channel.
	pub fn input(mut self, source: impl AsyncRead + Send + Unpin + 'static) -> Self {
		self.interactivity = Interactivity::NonInteractive(Some(Box::new(source)));
		self
	}
}
