//! The execution core: lifecycle state machine, processing dispatch and exit state resolution.

pub mod callbacks;
pub mod config;
pub mod dispatch;
mod dump;
pub mod exit;
pub mod handle;
pub mod input;
pub mod mode;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod scheduler;
#[cfg(test)]
mod testing;

pub use callbacks::{PostTerminationCallback, PreTerminationCallback};
pub use config::{ConfigError, ProcessConfig};
pub use dispatch::Handler;
pub use exit::{Cause, Dump, ExitState, ProcessState};
pub use handle::{Process, ProcessBuilder};
pub use input::ProcessInput;
pub use mode::{InputSource, Interactivity, ProcessingMode, Synchronicity};
pub use process::command::Command;
pub use process::{ChildControl, InputChannel, Launch, Launched, OutputChannel};
pub use registry::ProcessRegistry;
pub use resolver::{DefaultExitStateHandler, ExitStateHandler};
pub use scheduler::Scheduler;

use commander::CommandError;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("process has not been started")]
	NotStarted,

	#[error("process has already been started")]
	AlreadyStarted,

	#[error("process channels have already been dispatched")]
	AlreadyDispatched,

	#[error("input channel has already been taken")]
	InputUnavailable,

	#[error("failed to launch process: {0}")]
	Launch(#[source] CommandError),

	#[error("failed to signal process: {0}")]
	Signal(#[source] CommandError),

	#[error("failed to build scheduler: {0}")]
	Scheduler(String),

	#[error("cannot block on a process from within a runtime")]
	BlockingInAsyncContext,
}

/// Locks a mutex, recovering the data of a poisoned one.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
