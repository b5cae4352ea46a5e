use crate::process::InputChannel;
use harrier_io::IoLog;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// A process's input channel. Everything written is also recorded as `Input` lines.
///
/// Dropping or shutting it down closes the channel.
pub struct ProcessInput {
	inner: InputChannel,
	io: Arc<IoLog>,
}

impl ProcessInput {
	pub(crate) fn new(inner: InputChannel, io: Arc<IoLog>) -> Self {
		Self { inner, io }
	}
}

impl AsyncWrite for ProcessInput {
	fn poll_write(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<io::Result<usize>> {
		let this = &mut *self;
		match this.inner.as_mut().poll_write(cx, buf) {
			Poll::Ready(Ok(written)) => {
				this.io.input().feed(&buf[..written]);
				Poll::Ready(Ok(written))
			}
			other => other,
		}
	}

	fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		self.inner.as_mut().poll_flush(cx)
	}

	fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		self.inner.as_mut().poll_shutdown(cx)
	}
}

impl fmt::Debug for ProcessInput {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProcessInput").finish_non_exhaustive()
	}
}
