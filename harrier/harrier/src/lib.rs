//! Launch external programs, observe their I/O as typed records and receive a typed exit state.

pub mod config;
pub mod logging;

pub use harrier_io::*;
pub use harrier_process::*;
pub use harrier_state::*;
pub use harrier_util::*;

/// Forcefully kills every child started with the global registry that is still running.
///
/// Meant to be called once when the host exits. Returns how many children were signalled.
pub fn shutdown() -> usize {
	ProcessRegistry::global().shutdown()
}
