use std::sync::{Mutex, MutexGuard, PoisonError};

/// Receives the lines completed by a single `feed` or `flush`, in order.
pub type LineSink = Box<dyn Fn(Vec<String>) + Send + Sync>;

const LF: char = '\n';
const CR: char = '\r';
const NEL: char = '\u{85}';
const LS: char = '\u{2028}';
const PS: char = '\u{2029}';

/// Returns whether `c` ends a line on its own.
///
/// `CR` is special cased by the splitter since it may be the first half of `CRLF`.
fn is_terminator(c: char) -> bool {
	matches!(c, LF | CR | NEL | LS | PS)
}

#[derive(Debug, Default)]
struct Pending {
	/// Bytes of the current, unterminated line. Never contains a terminator.
	bytes: Vec<u8>,
	/// The last completed line ended in a bare `CR`; a `LF` arriving next belongs to it.
	after_cr: bool,
}

/// Turns arbitrary byte arrivals into complete text lines.
///
/// Every completed line is handed to the sink without its terminator. Recognized terminators
/// are `LF`, `CRLF`, `CR`, `NEL`, `LS` and `PS`. The sink is invoked while the assembler lock is
/// held so line order equals byte order; it must not feed the same assembler.
pub struct LineAssembler {
	pending: Mutex<Pending>,
	sink: LineSink,
}

impl LineAssembler {
	pub fn new(sink: impl Fn(Vec<String>) + Send + Sync + 'static) -> Self {
		Self { pending: Mutex::new(Pending::default()), sink: Box::new(sink) }
	}

	fn lock(&self) -> MutexGuard<'_, Pending> {
		self.pending.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Appends bytes and emits every line they complete.
	pub fn feed(&self, bytes: &[u8]) {
		let mut pending = self.lock();

		let mut bytes = bytes;
		if pending.after_cr && !bytes.is_empty() {
			pending.after_cr = false;
			if bytes[0] == b'\n' {
				bytes = &bytes[1..];
			}
		}
		if bytes.is_empty() {
			return;
		}
		pending.bytes.extend_from_slice(bytes);

		let decodable = pending.bytes.len() - incomplete_tail_len(&pending.bytes);
		let text = String::from_utf8_lossy(&pending.bytes[..decodable]).into_owned();
		let undecoded = pending.bytes[decodable..].to_vec();

		let (lines, rest, after_cr) = split_lines(&text);
		if lines.is_empty() {
			return;
		}

		let mut remainder = rest.as_bytes().to_vec();
		remainder.extend_from_slice(&undecoded);
		pending.after_cr = after_cr && undecoded.is_empty();
		pending.bytes = remainder;

		(self.sink)(lines);
	}

	/// Emits a non-empty unterminated tail as a final line.
	pub fn flush(&self) {
		let mut pending = self.lock();
		if pending.bytes.is_empty() {
			return;
		}

		let line = String::from_utf8_lossy(&pending.bytes).into_owned();
		pending.bytes.clear();

		(self.sink)(vec![line]);
	}

	/// Whether an unterminated fragment is currently buffered.
	pub fn has_pending(&self) -> bool {
		!self.lock().bytes.is_empty()
	}
}

impl std::fmt::Debug for LineAssembler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LineAssembler").field("pending", &*self.lock()).finish_non_exhaustive()
	}
}

/// Number of trailing bytes that form the start of a multi-byte UTF-8 sequence still waiting
/// for its continuation bytes.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
	let len = bytes.len();
	for back in 1..=len.min(3) {
		let byte = bytes[len - back];
		if byte & 0xC0 == 0x80 {
			continue;
		}
		let needed = match byte {
			0xF0..=0xFF => 4,
			0xE0..=0xEF => 3,
			0xC0..=0xDF => 2,
			_ => 1,
		};
		return if needed > back { back } else { 0 };
	}
	0
}

/// Splits text into completed lines and the unterminated rest.
///
/// The returned flag is set when the last completed line ended in a bare `CR` at the very end
/// of the text.
fn split_lines(text: &str) -> (Vec<String>, &str, bool) {
	let mut lines = Vec::new();
	let mut start = 0;
	let mut after_cr = false;
	let mut chars = text.char_indices().peekable();

	while let Some((index, c)) = chars.next() {
		if !is_terminator(c) {
			continue;
		}
		lines.push(text[start..index].to_string());
		let mut end = index + c.len_utf8();
		if c == CR {
			match chars.peek() {
				Some(&(next, LF)) => {
					chars.next();
					end = next + 1;
				}
				Some(_) => {}
				None => after_cr = true,
			}
		}
		start = end;
	}

	(lines, &text[start..], after_cr)
}
