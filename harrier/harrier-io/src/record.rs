use std::fmt;

/// The channel an [IoRecord] was observed on.
///
/// This does not simply use linux FDs because meta events are not backed by a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
	Input,
	Output,
	Error,
	Meta,
}

impl Channel {
	/// Wraps a line of text into a record tagged with this channel.
	pub fn record(self, text: impl Into<String>) -> IoRecord {
		let text = text.into();
		match self {
			Channel::Input => IoRecord::Input(text),
			Channel::Output => IoRecord::Output(text),
			Channel::Error => IoRecord::Error(text),
			Channel::Meta => IoRecord::Meta(text),
		}
	}
}

impl fmt::Display for Channel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Channel::Input => "input",
			Channel::Output => "output",
			Channel::Error => "error",
			Channel::Meta => "meta",
		};
		f.write_str(name)
	}
}

/// A single unit of observed process communication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IoRecord {
	Input(String),
	Output(String),
	Error(String),
	Meta(String),
}

impl IoRecord {
	/// The text carried by this record, without any line terminator.
	pub fn text(&self) -> &str {
		match self {
			IoRecord::Input(text)
			| IoRecord::Output(text)
			| IoRecord::Error(text)
			| IoRecord::Meta(text) => text,
		}
	}

	pub fn channel(&self) -> Channel {
		match self {
			IoRecord::Input(_) => Channel::Input,
			IoRecord::Output(_) => Channel::Output,
			IoRecord::Error(_) => Channel::Error,
			IoRecord::Meta(_) => Channel::Meta,
		}
	}

	pub fn is_meta(&self) -> bool {
		matches!(self, IoRecord::Meta(_))
	}
}

impl fmt::Display for IoRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.text())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_channel_tags_record() {
		assert_eq!(Channel::Output.record("a"), IoRecord::Output("a".to_string()));
		assert_eq!(Channel::Meta.record("m").channel(), Channel::Meta);
		assert_eq!(IoRecord::Error("oops".to_string()).to_string(), "oops");
	}
}
