use crate::callbacks::panic_message;
use crate::exit::ExitState;
use anyhow::anyhow;
use harrier_io::IoRecord;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Exit code reported when the child's code cannot be read.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Decides the exit state of a process that exited without a prior failure.
///
/// A handler is authoritative: it may report success for a non-zero exit code. Returning an
/// error or panicking resolves the process to [ExitState::Fatal].
pub trait ExitStateHandler: Send + Sync + 'static {
	fn resolve(&self, pid: u32, exit_code: i32, io: Vec<IoRecord>) -> anyhow::Result<ExitState>;
}

impl<F> ExitStateHandler for F
where
	F: Fn(u32, i32, Vec<IoRecord>) -> anyhow::Result<ExitState> + Send + Sync + 'static,
{
	fn resolve(&self, pid: u32, exit_code: i32, io: Vec<IoRecord>) -> anyhow::Result<ExitState> {
		self(pid, exit_code, io)
	}
}

/// Exit code 0 is a success, anything else a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExitStateHandler;

impl ExitStateHandler for DefaultExitStateHandler {
	fn resolve(&self, pid: u32, exit_code: i32, io: Vec<IoRecord>) -> anyhow::Result<ExitState> {
		Ok(match exit_code {
			0 => ExitState::success(pid, io),
			_ => ExitState::failure(exit_code, pid, io),
		})
	}
}

/// Computes the exit state.
///
/// A failure observed earlier in termination takes precedence over the exit code.
pub(crate) fn resolve(
	handler: &dyn ExitStateHandler,
	pid: u32,
	exit_code: Option<i32>,
	io: Vec<IoRecord>,
	failure: Option<anyhow::Error>,
) -> ExitState {
	if let Some(cause) = failure {
		return ExitState::fatal(cause, exit_code.unwrap_or(UNKNOWN_EXIT_CODE), pid, io);
	}
	let Some(exit_code) = exit_code else {
		return ExitState::fatal(
			anyhow!("process {pid} exited without an exit code"),
			UNKNOWN_EXIT_CODE,
			pid,
			io,
		);
	};

	match catch_unwind(AssertUnwindSafe(|| handler.resolve(pid, exit_code, io.clone()))) {
		Ok(Ok(state)) => state,
		Ok(Err(e)) => ExitState::fatal(e.context("exit state handler failed"), exit_code, pid, io),
		Err(payload) => ExitState::fatal(
			anyhow!("exit state handler panicked: {}", panic_message(&*payload)),
			exit_code,
			pid,
			io,
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn io() -> Vec<IoRecord> {
		vec![IoRecord::Output("a".to_string())]
	}

	#[test]
	fn test_default_handler_maps_exit_code() {
		assert!(resolve(&DefaultExitStateHandler, 1, Some(0), io(), None).successful());

		let failure = resolve(&DefaultExitStateHandler, 1, Some(7), io(), None);
		assert!(matches!(failure, ExitState::Failure { exit_code: 7, .. }));
		assert_eq!(failure.io(), io().as_slice());
	}

	#[test]
	fn test_prior_failure_beats_exit_code_zero() {
		let state = resolve(&DefaultExitStateHandler, 1, Some(0), io(), Some(anyhow!("callback")));
		assert!(matches!(state, ExitState::Fatal { exit_code: 0, .. }));
		assert_eq!(state.cause().map(|c| c.to_string()).as_deref(), Some("callback"));
	}

	#[test]
	fn test_missing_exit_code_is_fatal() {
		let state = resolve(&DefaultExitStateHandler, 1, None, io(), None);
		assert!(matches!(state, ExitState::Fatal { exit_code: UNKNOWN_EXIT_CODE, .. }));
	}

	#[test]
	fn test_handler_is_authoritative_but_never_masks_its_own_failure() {
		let lenient = |pid: u32, _code: i32, io: Vec<IoRecord>| -> anyhow::Result<ExitState> {
			Ok(ExitState::success(pid, io))
		};
		assert!(resolve(&lenient, 1, Some(3), io(), None).successful());

		let failing = |_pid: u32, _code: i32, _io: Vec<IoRecord>| -> anyhow::Result<ExitState> {
			Err(anyhow!("nope"))
		};
		assert!(matches!(resolve(&failing, 1, Some(0), io(), None), ExitState::Fatal { .. }));

		let panicking = |_pid: u32, _code: i32, _io: Vec<IoRecord>| -> anyhow::Result<ExitState> {
			panic!("handler")
		};
		let state = resolve(&panicking, 1, Some(0), io(), None);
		assert!(state.status().contains("exit state handler panicked: handler"));
	}
}
