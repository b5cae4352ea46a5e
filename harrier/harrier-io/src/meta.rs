use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscriber<E> {
	listener: Listener<E>,
	/// Index of the next history entry this listener has not seen.
	next: usize,
}

struct Inner<E> {
	history: Vec<E>,
	subscribers: Vec<Subscriber<E>>,
	/// Set while one caller fans pending events out to the listeners.
	delivering: bool,
}

type Batch<E> = Vec<(Listener<E>, Vec<E>)>;

/// A publish/subscribe bus that replays its history to late subscribers.
///
/// Every listener sees the full history in emission order. Listeners run outside the lock, one
/// delivering caller at a time, so they may emit into or subscribe to the same stream. Such
/// nested calls return at once and their events reach the listeners after the current one.
pub struct MetaStream<E> {
	inner: Mutex<Inner<E>>,
}

impl<E> Default for MetaStream<E>
where
	E: Clone + Send + Sync + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

/// Releases the delivery slot if a listener unwinds.
struct Delivery<'a, E> {
	inner: &'a Mutex<Inner<E>>,
	done: bool,
}

impl<E> Drop for Delivery<'_, E> {
	fn drop(&mut self) {
		if !self.done {
			self.inner.lock().unwrap_or_else(PoisonError::into_inner).delivering = false;
		}
	}
}

impl<E> MetaStream<E>
where
	E: Clone + Send + Sync + 'static,
{
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(Inner {
				history: Vec::new(),
				subscribers: Vec::new(),
				delivering: false,
			}),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Inner<E>> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Records the event and hands it to every listener in subscription order.
	pub fn emit(&self, event: E) {
		self.emit_with(event, |_| {});
	}

	/// Like [MetaStream::emit], running `record` in the same critical section that appends the
	/// event to the history. `record` must not touch this stream.
	pub fn emit_with(&self, event: E, record: impl FnOnce(&E)) {
		{
			let mut inner = self.lock();
			record(&event);
			inner.history.push(event);
		}
		self.deliver();
	}

	/// Replays the whole history to the listener, then registers it for future events.
	pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) {
		self.lock().subscribers.push(Subscriber { listener: Arc::new(listener), next: 0 });
		self.deliver();
	}

	/// A copy of every event emitted so far.
	pub fn history(&self) -> Vec<E> {
		self.lock().history.clone()
	}

	fn deliver(&self) {
		{
			let mut inner = self.lock();
			if inner.delivering {
				return;
			}
			inner.delivering = true;
		}

		let mut delivery = Delivery { inner: &self.inner, done: false };
		while let Some(batch) = self.next_batch() {
			for (listener, events) in batch {
				for event in &events {
					listener(event);
				}
			}
		}
		delivery.done = true;
	}

	/// Takes the undelivered events of every subscriber, or gives up the delivery slot.
	fn next_batch(&self) -> Option<Batch<E>> {
		let mut inner = self.lock();
		let Inner { history, subscribers, delivering } = &mut *inner;
		let batch: Batch<E> = subscribers
			.iter_mut()
			.filter(|subscriber| subscriber.next < history.len())
			.map(|subscriber| {
				let events = history[subscriber.next..].to_vec();
				subscriber.next = history.len();
				(subscriber.listener.clone(), events)
			})
			.collect();
		if batch.is_empty() {
			*delivering = false;
			return None;
		}
		trace!(listeners = batch.len(), "delivering meta events");
		Some(batch)
	}
}

impl<E> std::fmt::Debug for MetaStream<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
		f.debug_struct("MetaStream")
			.field("history", &inner.history.len())
			.field("listeners", &inner.subscribers.len())
			.finish()
	}
}
