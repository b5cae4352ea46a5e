use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Duration;

/// Resolve-once container holding an optional value.
///
/// The value starts unset and may be set exactly once. Every reader observes the same value
/// after it has been set.
#[derive(Debug)]
pub struct State<T: Clone + Send + Sync + 'static> {
	inner: Arc<RwLock<Option<T>>>,
	notify: Arc<Notify>,
}

impl<T: Clone + Send + Sync + 'static> Clone for State<T> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone(), notify: self.notify.clone() }
	}
}

impl<T: Clone + Send + Sync + 'static> Default for State<T> {
	fn default() -> Self {
		Self::new()
	}
}

/// Wrapper for writable state
#[derive(Debug, Clone)]
pub struct WritableState<T: Clone + Send + Sync + 'static> {
	state: State<T>,
}

/// Wrapper for read-only state
#[derive(Debug, Clone)]
pub struct ReadOnlyState<T: Clone + Send + Sync + 'static> {
	state: State<T>,
}

/// Errors raised when resolving or waiting on a state.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("state has already been resolved")]
	AlreadySet,

	#[error("state was not resolved within {0:?}")]
	Timeout(Duration),
}

impl<T: Clone + Send + Sync + 'static> State<T> {
	/// Creates a new empty state.
	pub fn new() -> Self {
		Self { inner: Arc::new(RwLock::new(None)), notify: Arc::new(Notify::new()) }
	}

	/// Converts the state into a writable state.
	pub fn write(&self) -> WritableState<T> {
		WritableState { state: self.clone() }
	}

	/// Converts the state into a read-only state.
	pub fn read(&self) -> ReadOnlyState<T> {
		ReadOnlyState { state: self.clone() }
	}

	fn get(&self) -> Option<T> {
		match self.inner.read() {
			Ok(lock) => lock.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	fn try_set(&self, value: T) -> Result<(), StateError> {
		{
			let mut lock = match self.inner.write() {
				Ok(lock) => lock,
				Err(poisoned) => poisoned.into_inner(),
			};
			if lock.is_some() {
				return Err(StateError::AlreadySet);
			}
			*lock = Some(value);
		}
		self.notify.notify_waiters();
		Ok(())
	}

	async fn wait_forever(&self) -> T {
		loop {
			let notified = self.notify.notified();
			tokio::pin!(notified);
			// Register interest before checking so a concurrent set cannot slip between.
			notified.as_mut().enable();

			if let Some(value) = self.get() {
				return value;
			}

			notified.await;
		}
	}
}

impl<T: Clone + Send + Sync + 'static> WritableState<T> {
	/// Resolves the state and notifies waiting readers.
	///
	/// Fails with [StateError::AlreadySet] if the state was resolved before; the stored value is
	/// left untouched in that case.
	pub fn try_set(&self, value: T) -> Result<(), StateError> {
		self.state.try_set(value)
	}
}

impl<T: Clone + Send + Sync + 'static> ReadOnlyState<T> {
	/// Waits for the state to be set and returns the value.
	pub async fn wait_forever(&self) -> T {
		self.state.wait_forever().await
	}

	/// Waits for the state to be set up to a given duration.
	pub async fn wait_for(&self, duration: Duration) -> Result<T, StateError> {
		tokio::time::timeout(duration, self.wait_forever())
			.await
			.map_err(|_| StateError::Timeout(duration))
	}

	/// Gets the current value if it's available.
	pub fn get(&self) -> Option<T> {
		self.state.get()
	}
}
