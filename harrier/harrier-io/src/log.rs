use crate::assembler::LineAssembler;
use crate::record::{Channel, IoRecord};
use itertools::Itertools;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Observes Input/Output/Error records as they are appended.
pub type RecordListener = Arc<dyn Fn(&IoRecord) + Send + Sync>;

#[derive(Default)]
struct Records {
	records: Mutex<Vec<IoRecord>>,
	listeners: Mutex<Vec<RecordListener>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Records {
	fn append(&self, record: IoRecord) {
		let notify = !record.is_meta();
		if notify {
			lock(&self.records).push(record.clone());
			let listeners = lock(&self.listeners).clone();
			for listener in listeners {
				listener(&record);
			}
		} else {
			lock(&self.records).push(record);
		}
	}
}

/// Ordered store of everything a process has said so far.
///
/// Bytes fed into the channel assemblers come out as [IoRecord]s once a line completes. Meta
/// records are appended directly and are not forwarded to record listeners; they travel over the
/// meta stream instead.
pub struct IoLog {
	records: Arc<Records>,
	input: LineAssembler,
	output: LineAssembler,
	error: LineAssembler,
}

impl Default for IoLog {
	fn default() -> Self {
		Self::new()
	}
}

impl IoLog {
	pub fn new() -> Self {
		let records = Arc::new(Records::default());
		Self {
			input: Self::assembler(&records, Channel::Input),
			output: Self::assembler(&records, Channel::Output),
			error: Self::assembler(&records, Channel::Error),
			records,
		}
	}

	fn assembler(records: &Arc<Records>, channel: Channel) -> LineAssembler {
		let records = records.clone();
		LineAssembler::new(move |lines| {
			for line in lines {
				records.append(channel.record(line));
			}
		})
	}

	/// Appends a record as is.
	pub fn append(&self, record: IoRecord) {
		self.records.append(record);
	}

	/// The assembler for bytes written to the process.
	pub fn input(&self) -> &LineAssembler {
		&self.input
	}

	/// The assembler for bytes read from the process's standard output.
	pub fn output(&self) -> &LineAssembler {
		&self.output
	}

	/// The assembler for bytes read from the process's standard error.
	pub fn error(&self) -> &LineAssembler {
		&self.error
	}

	/// Registers a listener for every Input/Output/Error record appended from now on.
	pub fn listen(&self, listener: impl Fn(&IoRecord) + Send + Sync + 'static) {
		lock(&self.records.listeners).push(Arc::new(listener));
	}

	/// A copy of all records in insertion order.
	pub fn snapshot(&self) -> Vec<IoRecord> {
		lock(&self.records.records).clone()
	}

	/// Force-emits unterminated tails of all three channels.
	pub fn flush(&self) {
		self.input.flush();
		self.output.flush();
		self.error.flush();
	}

	/// The text of all records in order, one per line.
	pub fn dump(&self) -> String {
		render(&self.snapshot())
	}

	pub fn len(&self) -> usize {
		lock(&self.records.records).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl std::fmt::Debug for IoLog {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IoLog").field("records", &self.len()).finish_non_exhaustive()
	}
}

/// Renders records as the concatenation of their text, one record per line.
pub fn render(records: &[IoRecord]) -> String {
	records.iter().map(IoRecord::text).join("\n")
}
