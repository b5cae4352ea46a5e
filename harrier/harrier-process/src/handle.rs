use crate::callbacks::TerminationCallbacks;
use crate::config::ProcessConfig;
use crate::dispatch::{self, Exited, Handler, HandlerFailure, Readers};
use crate::dump::DumpTarget;
use crate::exit::{ExitState, ProcessState};
use crate::input::ProcessInput;
use crate::mode::{Interactivity, ProcessingMode, Synchronicity};
use crate::process::{ChildControl, Launch, OutputChannel};
use crate::registry::ProcessRegistry;
use crate::resolver::{self, DefaultExitStateHandler, ExitStateHandler};
use crate::scheduler::Scheduler;
use crate::{lock, ProcessError};
use anyhow::anyhow;
use harrier_io::{IoLog, IoRecord, MetaStream};
use harrier_state::{ReadOnlyState, State};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

struct Channels {
	output: OutputChannel,
	error: OutputChannel,
}

struct Running {
	pid: u32,
	control: Arc<dyn ChildControl>,
	/// Taken by the single dispatch.
	channels: Option<Channels>,
	/// Taken by [Process::take_input] or by non-interactive dispatch.
	input: Option<ProcessInput>,
	exited: ReadOnlyState<Exited>,
}

struct Inner {
	launcher: Mutex<Box<dyn Launch>>,
	config: ProcessConfig,
	scheduler: Scheduler,
	registry: Arc<ProcessRegistry>,
	exit_state_handler: Arc<dyn ExitStateHandler>,
	io: Arc<IoLog>,
	meta: MetaStream<String>,
	callbacks: TerminationCallbacks,
	handler_failure: HandlerFailure,
	running: Mutex<Option<Running>>,
	terminated: State<Arc<ExitState>>,
}

/// Builds a [Process] around a launcher.
pub struct ProcessBuilder {
	launcher: Box<dyn Launch>,
	config: ProcessConfig,
	scheduler: Option<Scheduler>,
	registry: Option<Arc<ProcessRegistry>>,
	exit_state_handler: Option<Arc<dyn ExitStateHandler>>,
}

impl ProcessBuilder {
	pub fn config(mut self, config: ProcessConfig) -> Self {
		self.config = config;
		self
	}

	/// Defaults to the current runtime, or the global one outside of a runtime.
	pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
		self.scheduler = Some(scheduler);
		self
	}

	/// Defaults to [ProcessRegistry::global].
	pub fn registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
		self.registry = Some(registry);
		self
	}

	/// Replaces the [DefaultExitStateHandler].
	pub fn exit_state_handler(mut self, handler: impl ExitStateHandler) -> Self {
		self.exit_state_handler = Some(Arc::new(handler));
		self
	}

	pub fn build(self) -> Result<Process, ProcessError> {
		let scheduler = match self.scheduler {
			Some(scheduler) => scheduler,
			None => Scheduler::ambient()?,
		};
		Ok(Process {
			inner: Arc::new(Inner {
				launcher: Mutex::new(self.launcher),
				config: self.config,
				scheduler,
				registry: self.registry.unwrap_or_else(ProcessRegistry::global),
				exit_state_handler: self
					.exit_state_handler
					.unwrap_or_else(|| Arc::new(DefaultExitStateHandler)),
				io: Arc::new(IoLog::new()),
				meta: MetaStream::new(),
				callbacks: TerminationCallbacks::default(),
				handler_failure: HandlerFailure::default(),
				running: Mutex::new(None),
				terminated: State::new(),
			}),
		})
	}
}

/// A handle to one execution of an external program.
///
/// Clones share the same execution. The handle moves from [ProcessState::Prepared] to
/// [ProcessState::Running] on [Process::start] and to [ProcessState::Terminated] exactly once.
#[derive(Clone)]
pub struct Process {
	inner: Arc<Inner>,
}

impl Process {
	pub fn builder(launcher: impl Launch) -> ProcessBuilder {
		ProcessBuilder {
			launcher: Box::new(launcher),
			config: ProcessConfig::default(),
			scheduler: None,
			registry: None,
			exit_state_handler: None,
		}
	}

	/// A process with the default configuration, scheduler, registry and exit state handler.
	pub fn new(launcher: impl Launch) -> Result<Self, ProcessError> {
		Self::builder(launcher).build()
	}

	/// Spawns the program and returns its pid.
	///
	/// A launch failure leaves the process prepared.
	pub fn start(&self) -> Result<u32, ProcessError> {
		let mut running = lock(&self.inner.running);
		if running.is_some() {
			return Err(ProcessError::AlreadyStarted);
		}

		let (launched, description) = {
			let mut launcher = lock(&self.inner.launcher);
			let _context = self.inner.scheduler.handle().enter();
			(launcher.launch().map_err(ProcessError::Launch)?, launcher.describe())
		};
		let control = launched.control;
		let pid = control.pid();
		self.inner.registry.register(control.clone());

		let exited = State::new();
		let writer = exited.write();
		let watched = control.clone();
		let registry = self.inner.registry.clone();
		self.inner.scheduler.detach(async move {
			let result = watched.wait().await.map_err(Arc::new);
			registry.deregister(pid);
			debug!(pid, "child exited");
			if writer.try_set(result).is_err() {
				warn!(pid, "exit of child was observed twice");
			}
		});

		*running = Some(Running {
			pid,
			control,
			channels: Some(Channels { output: launched.output, error: launched.error }),
			input: Some(ProcessInput::new(launched.input, self.inner.io.clone())),
			exited: exited.read(),
		});
		drop(running);

		info!(pid, "Started {description}");
		self.emit_meta(format!("Started {description} as process {pid}."));
		Ok(pid)
	}

	/// Consumes the process's channels according to the mode, delivering every record to the
	/// handler.
	///
	/// Synchronous dispatch returns once the process has terminated. Asynchronous dispatch returns
	/// right away with the running state; use [Process::wait_for] to obtain the exit state.
	pub async fn process(
		&self,
		mode: ProcessingMode,
		handler: impl Fn(&IoRecord) + Send + Sync + 'static,
	) -> Result<ProcessState, ProcessError> {
		self.dispatch(mode, Arc::new(handler)).await
	}

	/// [Process::process] for callers outside of a runtime.
	pub fn process_blocking(
		&self,
		mode: ProcessingMode,
		handler: impl Fn(&IoRecord) + Send + Sync + 'static,
	) -> Result<ProcessState, ProcessError> {
		Self::ensure_blocking_allowed()?;
		self.inner.scheduler.block_on(self.process(mode, handler))
	}

	async fn dispatch(
		&self,
		mode: ProcessingMode,
		handler: Handler,
	) -> Result<ProcessState, ProcessError> {
		let (pid, channels, feed, idle_flush, exited) = {
			let mut running = lock(&self.inner.running);
			let running = running.as_mut().ok_or(ProcessError::NotStarted)?;
			let channels = running.channels.take().ok_or(ProcessError::AlreadyDispatched)?;
			let (feed, idle_flush) = match mode.interactivity {
				Interactivity::Interactive { non_blocking } => {
					(None, non_blocking.then(|| self.inner.config.idle_flush()))
				}
				Interactivity::NonInteractive(source) => {
					// Dropping an input without a source closes it.
					match (source, running.input.take()) {
						(Some(source), Some(input)) => (Some((source, input)), None),
						(Some(_), None) => {
							warn!(pid = running.pid, "input was taken before dispatch, ignoring source");
							(None, None)
						}
						(None, _) => (None, None),
					}
				}
			};
			(running.pid, channels, feed, idle_flush, running.exited.clone())
		};

		debug!(pid, ?mode.synchronicity, "dispatching process channels");
		dispatch::attach(
			&self.inner.io,
			&self.inner.meta,
			handler,
			self.inner.handler_failure.clone(),
		);
		let readers = Readers {
			io: self.inner.io.clone(),
			buffer_size: self.inner.config.read_buffer_size,
			idle_flush,
		};

		match mode.synchronicity {
			Synchronicity::Sync => {
				let failures =
					readers.run_inline(channels.output, channels.error, feed, exited).await;
				Ok(ProcessState::Terminated(self.terminate(failures).await))
			}
			Synchronicity::Async => {
				let tasks = readers.spawn(
					&self.inner.scheduler,
					channels.output,
					channels.error,
					feed,
					exited,
				);
				let process = self.clone();
				self.inner.scheduler.detach(async move {
					let failures = tasks.join().await;
					process.terminate(failures).await;
				});
				Ok(ProcessState::Running { pid })
			}
		}
	}

	/// Runs the termination pipeline once the child has exited and stores the exit state.
	async fn terminate(&self, failures: Vec<anyhow::Error>) -> Arc<ExitState> {
		if let Some(state) = self.exit_state() {
			return state;
		}
		let Some((pid, control, exited)) = lock(&self.inner.running)
			.as_ref()
			.map(|running| (running.pid, running.control.clone(), running.exited.clone()))
		else {
			// Dispatch requires a running process.
			return Arc::new(ExitState::fatal(
				anyhow!("terminated a process that was never started"),
				resolver::UNKNOWN_EXIT_CODE,
				0,
				Vec::new(),
			));
		};

		let exited = exited.wait_forever().await;
		let pre_failure = self.inner.callbacks.run_pre(self);
		self.inner.io.flush();
		let exit_code = control.exit_code();

		let failure = pre_failure
			.or_else(|| exited.err().map(|e| anyhow!("failed to await exit of process {pid}: {e}")))
			.or_else(|| failures.into_iter().next())
			.or_else(|| self.inner.handler_failure.take());
		let state = resolver::resolve(
			&*self.inner.exit_state_handler,
			pid,
			exit_code,
			self.inner.io.snapshot(),
			failure,
		);
		let working_dir = lock(&self.inner.launcher).working_dir();
		let target = DumpTarget::new(&self.inner.config, working_dir.as_deref());
		let state = Arc::new(target.complete(state).await);

		if self.inner.terminated.write().try_set(state.clone()).is_err() {
			return self.exit_state().unwrap_or(state);
		}
		info!(pid, "{}", state.status());
		self.emit_meta(state.status());
		self.inner.callbacks.run_post(self, &state);
		state
	}

	/// Waits for the exit state.
	///
	/// A started process that was never dispatched is dispatched asynchronously without a
	/// handler so its channels are drained into the I/O log.
	pub async fn wait_for(&self) -> Result<Arc<ExitState>, ProcessError> {
		Ok(self.terminated().await?.wait_forever().await)
	}

	/// Like [Process::wait_for], returning `None` once the timeout elapses. The process keeps
	/// running.
	pub async fn wait_for_timeout(
		&self,
		timeout: Duration,
	) -> Result<Option<Arc<ExitState>>, ProcessError> {
		Ok(self.terminated().await?.wait_for(timeout).await.ok())
	}

	/// The exit state cell, dispatching the process first if nobody did.
	async fn terminated(&self) -> Result<ReadOnlyState<Arc<ExitState>>, ProcessError> {
		if self.exit_state().is_none() {
			match self.dispatch(ProcessingMode::asynchronous(), Arc::new(|_: &IoRecord| {})).await {
				Ok(_) | Err(ProcessError::AlreadyDispatched) => {}
				Err(e) => return Err(e),
			}
		}
		Ok(self.inner.terminated.read())
	}

	/// [Process::wait_for] for callers outside of a runtime.
	pub fn wait_for_blocking(&self) -> Result<Arc<ExitState>, ProcessError> {
		Self::ensure_blocking_allowed()?;
		self.inner.scheduler.block_on(self.wait_for())
	}

	fn ensure_blocking_allowed() -> Result<(), ProcessError> {
		match Handle::try_current() {
			Ok(_) => Err(ProcessError::BlockingInAsyncContext),
			Err(_) => Ok(()),
		}
	}

	fn control(&self) -> Result<Arc<dyn ChildControl>, ProcessError> {
		lock(&self.inner.running)
			.as_ref()
			.map(|running| running.control.clone())
			.ok_or(ProcessError::NotStarted)
	}

	/// Requests graceful termination. Does not wait for the exit.
	pub fn stop(&self) -> Result<(), ProcessError> {
		self.control()?.stop().map_err(ProcessError::Signal)
	}

	/// Requests forceful termination. Does not wait for the exit.
	pub fn kill(&self) -> Result<(), ProcessError> {
		self.control()?.kill().map_err(ProcessError::Signal)
	}

	/// Hands the input channel to the caller for interactive use.
	pub fn take_input(&self) -> Result<ProcessInput, ProcessError> {
		lock(&self.inner.running)
			.as_mut()
			.ok_or(ProcessError::NotStarted)?
			.input
			.take()
			.ok_or(ProcessError::InputUnavailable)
	}

	/// Records a meta event and publishes it to meta subscribers.
	///
	/// The I/O log and the meta history receive concurrent events in the same order.
	pub fn emit_meta(&self, text: impl Into<String>) {
		let io = &self.inner.io;
		self.inner.meta.emit_with(text.into(), |text| io.append(IoRecord::Meta(text.clone())));
	}

	pub fn meta(&self) -> &MetaStream<String> {
		&self.inner.meta
	}

	/// A snapshot of every record observed so far.
	pub fn io(&self) -> Vec<IoRecord> {
		self.inner.io.snapshot()
	}

	pub fn add_pre_termination_callback(
		&self,
		callback: impl Fn(&Process) -> anyhow::Result<()> + Send + Sync + 'static,
	) {
		self.inner.callbacks.add_pre(Arc::new(callback));
	}

	pub fn add_post_termination_callback(
		&self,
		callback: impl Fn(&Process, &ExitState) -> anyhow::Result<()> + Send + Sync + 'static,
	) {
		self.inner.callbacks.add_post(Arc::new(callback));
	}

	/// `None` until the process has terminated.
	pub fn exit_state(&self) -> Option<Arc<ExitState>> {
		self.inner.terminated.read().get()
	}

	/// `None` until the process has terminated.
	pub fn successful(&self) -> Option<bool> {
		self.exit_state().map(|state| state.successful())
	}

	pub fn pid(&self) -> Option<u32> {
		lock(&self.inner.running).as_ref().map(|running| running.pid)
	}

	pub fn state(&self) -> ProcessState {
		if let Some(state) = self.exit_state() {
			return ProcessState::Terminated(state);
		}
		match self.pid() {
			Some(pid) => ProcessState::Running { pid },
			None => ProcessState::Prepared,
		}
	}
}

impl fmt::Debug for Process {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Process").field("state", &self.state()).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{Broken, FakeChild, FakeLaunch};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tracing_test::traced_test;

	fn process(launch: FakeLaunch) -> Result<Process, ProcessError> {
		Process::builder(launch)
			.registry(Arc::new(ProcessRegistry::new()))
			.config(ProcessConfig {
				dump_dir: Some(std::env::temp_dir()),
				dump_on_failure: false,
				..ProcessConfig::default()
			})
			.build()
	}

	fn records(process: &Process) -> Vec<IoRecord> {
		process.io().into_iter().filter(|record| !record.is_meta()).collect()
	}

	#[tokio::test]
	async fn test_out_of_order_transitions_are_rejected() -> Result<(), anyhow::Error> {
		let (launch, child) = FakeLaunch::finished(1, b"", b"", 0);
		let process = process(launch)?;

		assert!(matches!(process.state(), ProcessState::Prepared));
		assert!(process.exit_state().is_none());
		assert!(matches!(process.wait_for().await, Err(ProcessError::NotStarted)));
		assert!(matches!(process.stop(), Err(ProcessError::NotStarted)));

		assert_eq!(process.start()?, 1);
		assert!(matches!(process.start(), Err(ProcessError::AlreadyStarted)));
		assert!(matches!(process.state(), ProcessState::Running { pid: 1 }));

		process.process(ProcessingMode::synchronous(), |_| {}).await?;
		assert!(matches!(
			process.process(ProcessingMode::synchronous(), |_| {}).await,
			Err(ProcessError::AlreadyDispatched)
		));
		assert_eq!(process.successful(), Some(true));
		assert!(!child.was_killed());
		Ok(())
	}

	#[tokio::test]
	async fn test_failed_launch_stays_prepared() -> Result<(), anyhow::Error> {
		let process = process(FakeLaunch::failing())?;
		assert!(matches!(process.start(), Err(ProcessError::Launch(_))));
		assert!(matches!(process.state(), ProcessState::Prepared));
		Ok(())
	}

	#[tokio::test]
	async fn test_sync_dispatch_delivers_lines_and_flushes_tail() -> Result<(), anyhow::Error> {
		let (launch, _child) = FakeLaunch::finished(3, b"a\nb", b"warn\n", 0);
		let process = process(launch)?;
		process.start()?;

		let seen = Arc::new(Mutex::new(Vec::new()));
		let observed = seen.clone();
		let state = process
			.process(ProcessingMode::synchronous(), move |record| lock(&observed).push(record.clone()))
			.await?;

		let ProcessState::Terminated(exit) = state else {
			panic!("sync dispatch must terminate");
		};
		assert!(exit.successful());
		let outputs: Vec<_> =
			exit.io().iter().filter(|r| matches!(r, IoRecord::Output(_))).cloned().collect();
		assert_eq!(outputs, vec![IoRecord::Output("a".into()), IoRecord::Output("b".into())]);
		assert!(exit.io().contains(&IoRecord::Error("warn".into())));

		let seen = lock(&seen).clone();
		assert!(matches!(seen.first(), Some(IoRecord::Meta(text)) if text.starts_with("Started")));
		assert!(seen.contains(&IoRecord::Output("b".into())));
		Ok(())
	}

	#[tokio::test]
	async fn test_non_zero_exit_is_failure() -> Result<(), anyhow::Error> {
		let (launch, _child) = FakeLaunch::finished(4, b"", b"", 7);
		let process = process(launch)?;
		process.start()?;

		let exit = process.wait_for().await?;
		assert!(matches!(*exit, ExitState::Failure { exit_code: 7, pid: 4, .. }));
		assert_eq!(process.successful(), Some(false));
		assert!(exit.dump().is_some_and(|dump| dump.path().is_none()));
		Ok(())
	}

	#[tokio::test]
	async fn test_pre_callback_failure_wins_over_exit_code_zero() -> Result<(), anyhow::Error> {
		let (launch, _child) = FakeLaunch::finished(5, b"", b"", 0);
		let process = process(launch)?;
		let calls = Arc::new(AtomicUsize::new(0));
		let counted = calls.clone();
		process.add_pre_termination_callback(|_| Err(anyhow!("not ready")));
		process.add_pre_termination_callback(move |_| {
			counted.fetch_add(1, Ordering::SeqCst);
			Ok(())
		});
		process.start()?;

		let exit = process.wait_for().await?;
		assert!(matches!(*exit, ExitState::Fatal { exit_code: 0, .. }));
		assert!(exit.status().contains("not ready"));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		Ok(())
	}

	#[tokio::test]
	#[traced_test]
	async fn test_post_callback_failure_is_logged_only() -> Result<(), anyhow::Error> {
		let (launch, _child) = FakeLaunch::finished(6, b"", b"", 0);
		let process = process(launch)?;
		let observed = Arc::new(Mutex::new(None));
		let seen = observed.clone();
		process.add_post_termination_callback(move |process, exit| {
			*lock(&seen) = Some((process.successful(), exit.successful()));
			Err(anyhow!("notification failed"))
		});
		process.start()?;

		let exit = process.wait_for().await?;
		assert!(exit.successful());
		assert_eq!(*lock(&observed), Some((Some(true), true)));
		assert!(logs_contain("post-termination callback 0 failed: notification failed"));
		Ok(())
	}

	#[tokio::test]
	async fn test_output_failure_is_fatal_with_dump_file() -> Result<(), anyhow::Error> {
		let dir = tempfile::tempdir()?;
		let child = Arc::new(FakeChild::new(8));
		child.finish(0);
		let launch = FakeLaunch::new(Box::pin(Broken), Box::pin(&b""[..]), child);
		let process = Process::builder(launch)
			.registry(Arc::new(ProcessRegistry::new()))
			.config(ProcessConfig::default().with_dump_dir(dir.path()))
			.build()?;
		process.start()?;

		let state = process.process(ProcessingMode::asynchronous(), |_| {}).await?;
		assert!(matches!(state, ProcessState::Running { pid: 8 }));

		let exit = process.wait_for().await?;
		assert!(matches!(*exit, ExitState::Fatal { .. }));
		assert!(exit.status().contains("failed to consume output channel"));
		let path = dir.path().join("harrier.8.dump.log");
		assert_eq!(exit.dump().and_then(|dump| dump.path()), Some(path.as_path()));
		assert!(std::fs::read_to_string(&path)?.contains("Cause: failed to consume output channel: boom"));
		Ok(())
	}

	#[tokio::test]
	async fn test_custom_handler_is_authoritative() -> Result<(), anyhow::Error> {
		let (launch, _child) = FakeLaunch::finished(9, b"done\n", b"", 3);
		let process = Process::builder(launch)
			.registry(Arc::new(ProcessRegistry::new()))
			.exit_state_handler(
				|pid: u32, exit_code: i32, io: Vec<IoRecord>| -> anyhow::Result<ExitState> {
					Ok(ExitState::Success { pid, exit_code, io })
				},
			)
			.build()?;
		process.start()?;

		let exit = process.wait_for().await?;
		assert!(exit.successful());
		assert_eq!(exit.exit_code(), 3);
		Ok(())
	}

	#[tokio::test]
	async fn test_handler_panic_resolves_to_fatal() -> Result<(), anyhow::Error> {
		let (launch, _child) = FakeLaunch::finished(10, b"explode\n", b"", 0);
		let process = process(launch)?;
		process.start()?;

		let state = process
			.process(ProcessingMode::synchronous(), |record| {
				if record.text() == "explode" {
					panic!("handler exploded");
				}
			})
			.await?;
		assert_eq!(state.successful(), Some(false));
		assert!(state.status().contains("record handler panicked: handler exploded"));
		Ok(())
	}

	#[tokio::test]
	async fn test_concurrent_waiters_share_one_exit_state() -> Result<(), anyhow::Error> {
		let (launch, child) = FakeLaunch::pending(11);
		let process = process(launch)?;
		process.start()?;

		let waiters: Vec<_> = (0..8)
			.map(|_| {
				let process = process.clone();
				tokio::spawn(async move { process.wait_for().await })
			})
			.collect();
		assert!(process.wait_for_timeout(Duration::from_millis(20)).await?.is_none());
		child.finish(0);

		let first = process.wait_for().await?;
		for waiter in waiters {
			assert!(Arc::ptr_eq(&first, &waiter.await??));
		}
		Ok(())
	}

	#[tokio::test]
	async fn test_non_interactive_input_is_forwarded_and_recorded() -> Result<(), anyhow::Error> {
		let (launch, child, mut stdin) = FakeLaunch::with_input(12);
		let process = process(launch)?;
		process.start()?;

		process
			.process(ProcessingMode::asynchronous().input(&b"ping\n"[..]), |_| {})
			.await?;
		let mut forwarded = String::new();
		stdin.read_to_string(&mut forwarded).await?;
		child.finish(0);

		let exit = process.wait_for().await?;
		assert_eq!(forwarded, "ping\n");
		assert!(exit.io().contains(&IoRecord::Input("ping".into())));
		Ok(())
	}

	#[tokio::test]
	async fn test_interactive_input_stays_with_caller() -> Result<(), anyhow::Error> {
		let (launch, child, mut stdin) = FakeLaunch::with_input(13);
		let process = process(launch)?;
		process.start()?;

		let mut input = process.take_input()?;
		assert!(matches!(process.take_input(), Err(ProcessError::InputUnavailable)));
		process.process(ProcessingMode::asynchronous().interactive(false), |_| {}).await?;

		input.write_all(b"y\n").await?;
		drop(input);
		let mut forwarded = String::new();
		stdin.read_to_string(&mut forwarded).await?;
		child.finish(0);

		assert_eq!(forwarded, "y\n");
		assert!(process.wait_for().await?.io().contains(&IoRecord::Input("y".into())));
		Ok(())
	}

	#[tokio::test]
	async fn test_kill_terminates_running_process() -> Result<(), anyhow::Error> {
		let (launch, child) = FakeLaunch::pending(14);
		let process = process(launch)?;
		process.start()?;

		process.kill()?;
		let exit = process.wait_for().await?;
		assert!(child.was_killed());
		assert!(matches!(*exit, ExitState::Failure { exit_code: 137, .. }));
		assert!(records(&process).is_empty());
		Ok(())
	}

	fn logged_meta(process: &Process) -> Vec<String> {
		process
			.io()
			.iter()
			.filter(|record| record.is_meta())
			.map(|record| record.text().to_string())
			.collect()
	}

	#[tokio::test]
	async fn test_handler_and_subscribers_may_emit_meta() -> Result<(), anyhow::Error> {
		let (launch, _child) = FakeLaunch::finished(14, b"hi\n", b"", 0);
		let process = process(launch)?;
		process.start()?;

		let subscriber = process.clone();
		process.meta().subscribe(move |text: &String| {
			if text.contains("terminated") {
				subscriber.emit_meta("subscriber saw exit");
			}
		});
		let handler = process.clone();
		let dispatch = process.process(ProcessingMode::synchronous(), move |record| {
			if matches!(record, IoRecord::Meta(text) if text.starts_with("Started")) {
				handler.emit_meta("handler saw start");
			}
		});
		let state = tokio::time::timeout(Duration::from_secs(5), dispatch).await??;

		assert_eq!(state.successful(), Some(true));
		let history = process.meta().history();
		assert_eq!(history.get(1).map(String::as_str), Some("handler saw start"));
		assert_eq!(history.last().map(String::as_str), Some("subscriber saw exit"));
		assert_eq!(logged_meta(&process), history);
		Ok(())
	}

	#[tokio::test]
	async fn test_concurrent_meta_events_keep_one_order() -> Result<(), anyhow::Error> {
		let (launch, _child) = FakeLaunch::finished(15, b"", b"", 0);
		let process = process(launch)?;

		let emitters: Vec<_> = (0..4)
			.map(|worker| {
				let process = process.clone();
				std::thread::spawn(move || {
					for i in 0..50 {
						process.emit_meta(format!("{worker}:{i}"));
					}
				})
			})
			.collect();
		for emitter in emitters {
			emitter.join().map_err(|_| anyhow!("emitter panicked"))?;
		}

		assert_eq!(logged_meta(&process).len(), 200);
		assert_eq!(logged_meta(&process), process.meta().history());
		Ok(())
	}
}
