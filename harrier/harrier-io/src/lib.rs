//! Byte-to-line reconstruction and the per-process record store.

pub mod assembler;
pub mod log;
pub mod meta;
pub mod record;

pub use assembler::LineAssembler;
pub use log::{render, IoLog, RecordListener};
pub use meta::MetaStream;
pub use record::{Channel, IoRecord};
