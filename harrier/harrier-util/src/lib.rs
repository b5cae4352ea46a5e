use futures::future::{AbortHandle, Abortable, Aborted};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Errors thrown by the Task struct.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
	#[error("task aborted: {0}")]
	Aborted(#[source] Aborted),
	#[error("join error: {0}")]
	Join(#[source] tokio::task::JoinError),
}

/// A value that may be aborted
#[derive(Debug)]
pub enum Maybe<T> {
	Value(T),
	Aborted(Aborted),
}

/// A task that can be spawned, aborted, and awaited
#[derive(Debug)]
pub struct Task<T> {
	/// The join handle for awaiting the task
	pub handle: JoinHandle<Result<T, Aborted>>,
	/// The abort handle for cancelling the task
	pub abort_handle: AbortHandle,
}

impl<T> Task<T> {
	/// Aborts the task
	pub fn abort(&self) {
		self.abort_handle.abort();
		self.handle.abort();
	}

	/// Returns whether the task has been aborted
	pub fn is_aborted(&self) -> bool {
		self.abort_handle.is_aborted()
	}

	/// Returns whether the underlying future has run to completion (or was cancelled).
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}

	/// Awaits a task, but allows an abort by wrapping as a [Maybe]
	pub async fn maybe(self) -> Result<Maybe<T>, TaskError> {
		match self.await {
			Ok(result) => Ok(Maybe::Value(result)),
			Err(TaskError::Aborted(e)) => Ok(Maybe::Aborted(e)),
			Err(TaskError::Join(join_error)) if join_error.is_cancelled() => Ok(Maybe::Aborted(Aborted)),
			Err(e) => Err(e),
		}
	}

	/// Awaits a task, treating an abort as a normal end.
	///
	/// Panics inside the task surface as [TaskError::Join].
	pub async fn await_allow_abort(self) -> Result<Option<T>, TaskError> {
		match self.maybe().await? {
			Maybe::Value(value) => Ok(Some(value)),
			Maybe::Aborted(_) => Ok(None),
		}
	}
}

/// In contrast to tokio's task, this task will abort when dropped
///
/// This means you have to hold the task handle to ensure the task is not aborted
/// when the task handle is dropped.
impl<T> Drop for Task<T> {
	fn drop(&mut self) {
		self.abort();
	}
}

impl<T> Future for Task<T> {
	type Output = Result<T, TaskError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.handle).poll(cx) {
			Poll::Pending => Poll::Pending,
			Poll::Ready(Ok(result)) => match result {
				Ok(result) => Poll::Ready(Ok(result)),
				Err(e) => Poll::Ready(Err(TaskError::Aborted(e))),
			},
			Poll::Ready(Err(e)) => Poll::Ready(Err(TaskError::Join(e))),
		}
	}
}

/// Spawns an abortable task on the current runtime and returns a Task struct
pub fn task<F, T>(f: F) -> Task<T>
where
	F: Future<Output = T> + Send + 'static,
	T: Send + 'static,
{
	task_on(&Handle::current(), f)
}

/// Spawns an abortable task on the given runtime and returns a Task struct
pub fn task_on<F, T>(runtime: &Handle, f: F) -> Task<T>
where
	F: Future<Output = T> + Send + 'static,
	T: Send + 'static,
{
	let (abort_handle, abort_reg) = AbortHandle::new_pair();
	let handle = runtime.spawn(Abortable::new(f, abort_reg));

	Task { handle, abort_handle }
}
