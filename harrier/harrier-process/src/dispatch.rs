use crate::callbacks::panic_message;
use crate::input::ProcessInput;
use crate::lock;
use crate::mode::InputSource;
use crate::process::OutputChannel;
use crate::scheduler::Scheduler;
use anyhow::anyhow;
use futures::future::{self, Either};
use harrier_io::{Channel, IoLog, IoRecord, LineAssembler, MetaStream};
use harrier_state::ReadOnlyState;
use harrier_util::{Task, TaskError};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Receives every record observed on a dispatched process, meta events included.
pub type Handler = Arc<dyn Fn(&IoRecord) + Send + Sync>;

/// Resolved by the exit watcher once the child has been reaped.
pub(crate) type Exited = Result<(), Arc<io::Error>>;

/// The first panic raised by a record handler.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandlerFailure(Arc<Mutex<Option<anyhow::Error>>>);

impl HandlerFailure {
	fn record(&self, failure: anyhow::Error) {
		lock(&self.0).get_or_insert(failure);
	}

	pub(crate) fn take(&self) -> Option<anyhow::Error> {
		lock(&self.0).take()
	}
}

/// Delivers live records and the meta history to the handler.
///
/// A panicking handler is recorded as a failure instead of unwinding through the readers.
pub(crate) fn attach(
	io: &IoLog,
	meta: &MetaStream<String>,
	handler: Handler,
	failure: HandlerFailure,
) {
	let deliver = Arc::new(move |record: &IoRecord| {
		if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(record))) {
			failure.record(anyhow!("record handler panicked: {}", panic_message(&*payload)));
		}
	});

	let live = deliver.clone();
	io.listen(move |record| live(record));
	meta.subscribe(move |text| deliver(&IoRecord::Meta(text.clone())));
}

type Select = fn(&IoLog) -> &LineAssembler;

/// Whether an I/O error only says that the other side already went away.
fn is_closed(error: &io::Error) -> bool {
	matches!(
		error.kind(),
		io::ErrorKind::BrokenPipe
			| io::ErrorKind::ConnectionReset
			| io::ErrorKind::ConnectionAborted
			| io::ErrorKind::NotConnected
			| io::ErrorKind::UnexpectedEof
	) || error.to_string().to_lowercase().contains("closed")
}

/// Pumps channel bytes into the I/O log.
#[derive(Debug, Clone)]
pub(crate) struct Readers {
	pub(crate) io: Arc<IoLog>,
	pub(crate) buffer_size: usize,
	/// Set for non-blocking interactive dispatch.
	pub(crate) idle_flush: Option<Duration>,
}

impl Readers {
	/// Reads the channel until it is exhausted.
	pub(crate) async fn consume(
		&self,
		channel: Channel,
		mut source: OutputChannel,
		select: Select,
	) -> anyhow::Result<()> {
		let mut buffer = vec![0; self.buffer_size.max(1)];
		loop {
			let read = match self.idle_flush {
				Some(idle) => match tokio::time::timeout(idle, source.read(&mut buffer)).await {
					Ok(read) => read,
					Err(_) => {
						select(&self.io).flush();
						continue;
					}
				},
				None => source.read(&mut buffer).await,
			};

			match read {
				Ok(0) => return Ok(()),
				Ok(n) => select(&self.io).feed(&buffer[..n]),
				Err(e) if is_closed(&e) => {
					debug!(%channel, "channel closed while reading: {e}");
					return Ok(());
				}
				Err(e) => {
					let context = format!("failed to consume {channel} channel");
					return Err(anyhow::Error::new(e).context(context));
				}
			}
		}
	}

	/// Copies the source into the input channel chunk by chunk, then closes the channel.
	pub(crate) async fn forward(
		&self,
		mut source: InputSource,
		mut input: ProcessInput,
	) -> anyhow::Result<()> {
		let mut buffer = vec![0; self.buffer_size.max(1)];
		loop {
			let n = source
				.read(&mut buffer)
				.await
				.map_err(|e| anyhow::Error::new(e).context("failed to read input source"))?;
			if n == 0 {
				break;
			}
			match input.write_all(&buffer[..n]).await {
				Ok(()) => {}
				Err(e) if is_closed(&e) => {
					debug!("input channel closed while forwarding: {e}");
					return Ok(());
				}
				Err(e) => return Err(anyhow::Error::new(e).context("failed to forward input")),
			}
		}

		match input.shutdown().await {
			Err(e) if !is_closed(&e) => Err(anyhow::Error::new(e).context("failed to close input")),
			_ => Ok(()),
		}
	}

	/// Forwards the source until it ends or the child exits, whichever comes first.
	///
	/// Input left over once the child is gone has no reader, so it is dropped along with the
	/// channel.
	pub(crate) async fn forward_until_exit(
		&self,
		source: InputSource,
		input: ProcessInput,
		exited: ReadOnlyState<Exited>,
	) -> anyhow::Result<()> {
		let feeding = self.forward(source, input);
		let exit = exited.wait_forever();
		futures::pin_mut!(feeding, exit);
		match future::select(feeding, exit).await {
			Either::Left((fed, _)) => fed,
			Either::Right(_) => {
				debug!("child exited before input was forwarded, closing input");
				Ok(())
			}
		}
	}

	/// Drives both readers, and the forwarder when given, on the calling task.
	///
	/// Forwarding runs alongside reading so a program that writes before it finished reading
	/// cannot deadlock on a full pipe.
	pub(crate) async fn run_inline(
		&self,
		output: OutputChannel,
		error: OutputChannel,
		feed: Option<(InputSource, ProcessInput)>,
		exited: ReadOnlyState<Exited>,
	) -> Vec<anyhow::Error> {
		let feeding = async move {
			match feed {
				Some((source, input)) => self.forward_until_exit(source, input, exited).await,
				None => Ok(()),
			}
		};
		let (fed, output, error) = future::join3(
			feeding,
			self.consume(Channel::Output, output, IoLog::output),
			self.consume(Channel::Error, error, IoLog::error),
		)
		.await;
		[fed, output, error].into_iter().filter_map(Result::err).collect()
	}

	/// Spawns one task per channel on the scheduler.
	pub(crate) fn spawn(
		&self,
		scheduler: &Scheduler,
		output: OutputChannel,
		error: OutputChannel,
		feed: Option<(InputSource, ProcessInput)>,
		exited: ReadOnlyState<Exited>,
	) -> IoTasks {
		let readers = self.clone();
		let input = feed.map(|(source, input)| {
			scheduler.spawn(async move {
				readers.forward_until_exit(source, input, exited).await
			})
		});
		let readers = self.clone();
		let output = scheduler
			.spawn(async move { readers.consume(Channel::Output, output, IoLog::output).await });
		let readers = self.clone();
		let error = scheduler
			.spawn(async move { readers.consume(Channel::Error, error, IoLog::error).await });
		IoTasks { input, output, error }
	}
}

type IoTask = Task<anyhow::Result<()>>;

/// The channel tasks of an asynchronous dispatch.
pub(crate) struct IoTasks {
	input: Option<IoTask>,
	output: IoTask,
	error: IoTask,
}

impl IoTasks {
	/// Waits for every channel task. The forwarder ends at the latest when the child exits.
	pub(crate) async fn join(self) -> Vec<anyhow::Error> {
		let IoTasks { input, output, error } = self;
		let input = async move {
			match input {
				Some(input) => settle(Channel::Input, input).await,
				None => None,
			}
		};
		let (input, output, error) = future::join3(
			input,
			settle(Channel::Output, output),
			settle(Channel::Error, error),
		)
		.await;
		[input, output, error].into_iter().flatten().collect()
	}
}

async fn settle(channel: Channel, task: IoTask) -> Option<anyhow::Error> {
	match task.await_allow_abort().await {
		Ok(Some(Ok(()))) | Ok(None) => None,
		Ok(Some(Err(e))) => Some(e),
		Err(TaskError::Join(e)) if e.is_panic() => {
			Some(anyhow!("{channel} task panicked: {}", panic_message(&*e.into_panic())))
		}
		Err(e) => Some(anyhow::Error::new(e).context(format!("{channel} task failed"))),
	}
}
