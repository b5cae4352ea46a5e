use crate::lock;
use crate::process::ChildControl;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info, warn};

static GLOBAL: OnceLock<Arc<ProcessRegistry>> = OnceLock::new();

/// Tracks every running child so the host can kill the survivors on exit.
///
/// Children are registered when started and deregistered as soon as they exit.
#[derive(Default)]
pub struct ProcessRegistry {
	children: Mutex<HashMap<u32, Arc<dyn ChildControl>>>,
}

impl ProcessRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// The registry processes use unless another one is injected.
	pub fn global() -> Arc<Self> {
		GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
	}

	pub fn register(&self, child: Arc<dyn ChildControl>) {
		let pid = child.pid();
		debug!(pid, "registering child");
		lock(&self.children).insert(pid, child);
	}

	pub fn deregister(&self, pid: u32) {
		if lock(&self.children).remove(&pid).is_some() {
			debug!(pid, "deregistered child");
		}
	}

	pub fn contains(&self, pid: u32) -> bool {
		lock(&self.children).contains_key(&pid)
	}

	pub fn len(&self) -> usize {
		lock(&self.children).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Forcefully kills every registered child and empties the registry.
	///
	/// Returns how many children were signalled successfully.
	pub fn shutdown(&self) -> usize {
		let children: Vec<_> = lock(&self.children).drain().collect();
		if !children.is_empty() {
			info!(count = children.len(), "killing surviving child processes");
		}

		let mut killed = 0;
		for (pid, child) in children {
			match child.kill() {
				Ok(()) => killed += 1,
				Err(e) => warn!(pid, "failed to kill child on shutdown: {e}"),
			}
		}
		killed
	}
}

impl fmt::Debug for ProcessRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut pids: Vec<u32> = lock(&self.children).keys().copied().collect();
		pids.sort_unstable();
		f.debug_struct("ProcessRegistry").field("pids", &pids).finish()
	}
}
