use crate::ProcessError;
use harrier_util::{task_on, Task};
use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Handle, Runtime};

static GLOBAL: OnceLock<Result<Runtime, String>> = OnceLock::new();

/// The pool asynchronous dispatch, exit watching and termination run on.
#[derive(Debug, Clone)]
pub struct Scheduler {
	handle: Handle,
}

impl Scheduler {
	/// The process-wide multi-threaded runtime, created on first use and never torn down.
	pub fn global() -> Result<Self, ProcessError> {
		let runtime = GLOBAL.get_or_init(|| {
			Builder::new_multi_thread()
				.thread_name("harrier-worker")
				.enable_all()
				.build()
				.map_err(|e| e.to_string())
		});
		match runtime {
			Ok(runtime) => Ok(Self { handle: runtime.handle().clone() }),
			Err(e) => Err(ProcessError::Scheduler(e.clone())),
		}
	}

	/// The runtime the caller is running on, if any.
	pub fn current() -> Option<Self> {
		Handle::try_current().ok().map(Self::from)
	}

	/// The current runtime when called from one, the global runtime otherwise.
	pub fn ambient() -> Result<Self, ProcessError> {
		match Self::current() {
			Some(scheduler) => Ok(scheduler),
			None => Self::global(),
		}
	}

	pub fn handle(&self) -> &Handle {
		&self.handle
	}

	/// Spawns an abortable task. Dropping the task aborts it.
	pub fn spawn<F, T>(&self, future: F) -> Task<T>
	where
		F: Future<Output = T> + Send + 'static,
		T: Send + 'static,
	{
		task_on(&self.handle, future)
	}

	/// Spawns a task that runs to completion on its own.
	pub fn detach<F>(&self, future: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		drop(self.handle.spawn(future));
	}

	/// Drives a future to completion on the calling thread. Must not be called from within a
	/// runtime.
	pub fn block_on<F: Future>(&self, future: F) -> F::Output {
		self.handle.block_on(future)
	}
}

impl From<Handle> for Scheduler {
	fn from(handle: Handle) -> Self {
		Self { handle }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::runtime::RuntimeFlavor;

	#[test]
	fn test_global_blocks_outside_runtime() -> Result<(), ProcessError> {
		assert!(Scheduler::current().is_none());
		let scheduler = Scheduler::ambient()?;
		let task = scheduler.spawn(async { 21 * 2 });
		assert_eq!(scheduler.block_on(task).ok(), Some(42));
		Ok(())
	}

	#[tokio::test]
	async fn test_ambient_prefers_current_runtime() -> Result<(), ProcessError> {
		let scheduler = Scheduler::ambient()?;
		// The global runtime is multi-threaded, the test runtime is not.
		assert_eq!(scheduler.handle().runtime_flavor(), RuntimeFlavor::CurrentThread);
		Ok(())
	}
}
