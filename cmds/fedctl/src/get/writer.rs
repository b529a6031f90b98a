//! Serialized access to the shared output sink.

use std::{
	io::{self, Write},
	sync::Mutex,
};

use super::lock;

/// Sink that counts written bytes and can emit a separating blank line before the next write.
pub struct TrackedSink<W> {
	delegate: W,
	written: usize,
	separator_ready: bool,
	headers_emitted: bool,
}

impl<W: Write> TrackedSink<W> {
	fn new(delegate: W) -> Self {
		Self {
			delegate,
			written: 0,
			separator_ready: false,
			headers_emitted: false,
		}
	}

	/// Bytes written so far, separators included.
	pub fn written(&self) -> usize {
		self.written
	}

	/// The next non-empty write is preceded by a blank line.
	pub fn set_separator_ready(&mut self) {
		self.separator_ready = true;
	}

	pub fn headers_emitted(&self) -> bool {
		self.headers_emitted
	}

	pub fn mark_headers_emitted(&mut self) {
		self.headers_emitted = true;
	}
}

impl<W: Write> Write for TrackedSink<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}
		if self.separator_ready {
			self.delegate.write_all(b"\n")?;
			self.written += 1;
			self.separator_ready = false;
		}
		let n = self.delegate.write(buf)?;
		self.written += n;
		Ok(n)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.delegate.flush()
	}
}

/// Owns the output sink; every render goes through [`OutputCoordinator::with_sink`].
pub struct OutputCoordinator<W> {
	sink: Mutex<TrackedSink<W>>,
}

impl<W: Write> OutputCoordinator<W> {
	pub fn new(delegate: W) -> Self {
		Self {
			sink: Mutex::new(TrackedSink::new(delegate)),
		}
	}

	/// Run `f` with exclusive access to the sink, so a whole render lands contiguously.
	pub fn with_sink<R>(&self, f: impl FnOnce(&mut TrackedSink<W>) -> R) -> R {
		f(&mut *lock(&self.sink))
	}

	pub fn written(&self) -> usize {
		lock(&self.sink).written()
	}

	pub fn into_inner(self) -> W {
		self.sink
			.into_inner()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.delegate
	}
}
