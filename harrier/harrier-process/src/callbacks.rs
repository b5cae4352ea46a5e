use crate::exit::ExitState;
use crate::{lock, Process};
use anyhow::anyhow;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Runs after the process exited and before its exit state is computed.
pub type PreTerminationCallback = Arc<dyn Fn(&Process) -> anyhow::Result<()> + Send + Sync>;

/// Runs once the exit state is stored.
pub type PostTerminationCallback =
	Arc<dyn Fn(&Process, &ExitState) -> anyhow::Result<()> + Send + Sync>;

/// The ordered termination callback chains of one process.
#[derive(Default)]
pub(crate) struct TerminationCallbacks {
	pre: Mutex<Vec<PreTerminationCallback>>,
	post: Mutex<Vec<PostTerminationCallback>>,
}

impl TerminationCallbacks {
	pub(crate) fn add_pre(&self, callback: PreTerminationCallback) {
		lock(&self.pre).push(callback);
	}

	pub(crate) fn add_post(&self, callback: PostTerminationCallback) {
		lock(&self.post).push(callback);
	}

	/// Runs every pre-termination callback in order and returns the first failure.
	///
	/// A failing or panicking callback does not stop the ones registered after it.
	pub(crate) fn run_pre(&self, process: &Process) -> Option<anyhow::Error> {
		let callbacks = lock(&self.pre).clone();
		let mut first = None;
		for (index, callback) in callbacks.iter().enumerate() {
			let failure = match catch_unwind(AssertUnwindSafe(|| callback(process))) {
				Ok(Ok(())) => continue,
				Ok(Err(e)) => e.context(format!("pre-termination callback {index} failed")),
				Err(payload) => {
					anyhow!("pre-termination callback {index} panicked: {}", panic_message(&*payload))
				}
			};
			debug!("{failure:#}");
			first.get_or_insert(failure);
		}
		first
	}

	/// Runs every post-termination callback in order. Failures are logged and otherwise ignored.
	pub(crate) fn run_post(&self, process: &Process, exit: &ExitState) {
		let callbacks = lock(&self.post).clone();
		for (index, callback) in callbacks.iter().enumerate() {
			match catch_unwind(AssertUnwindSafe(|| callback(process, exit))) {
				Ok(Ok(())) => {}
				Ok(Err(e)) => error!(pid = exit.pid(), "post-termination callback {index} failed: {e:#}"),
				Err(payload) => error!(
					pid = exit.pid(),
					"post-termination callback {index} panicked: {}",
					panic_message(&*payload)
				),
			}
		}
	}
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}
