//! Line-prefixed output shared by many hosts.
//!
//! Every host gets its own [`PrefixWriter`] per stream, all of them writing
//! into the same [`SharedSink`]. A writer only ever hands complete lines to the
//! sink, prefix included, while holding the sink lock, so lines from different
//! hosts never interleave.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Longest partial line held back before it is emitted as a line of its own.
pub const MAX_PENDING: usize = 64 * 1024;

pub type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn shared_sink<W: Write + Send + 'static>(writer: W) -> SharedSink {
    Arc::new(Mutex::new(Box::new(writer)))
}

fn lock(sink: &SharedSink) -> MutexGuard<'_, Box<dyn Write + Send>> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PrefixWriter {
    prefix: Vec<u8>,
    sink: SharedSink,
    // Bytes of the current line not yet terminated by '\n'.
    pending: Vec<u8>,
    max_pending: usize,
}

impl PrefixWriter {
    pub fn new(prefix: impl Into<String>, sink: SharedSink) -> Self {
        Self {
            prefix: prefix.into().into_bytes(),
            sink,
            pending: Vec::new(),
            max_pending: MAX_PENDING,
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn at_line_start(&self) -> bool {
        self.pending.is_empty()
    }

    /// Emit a trailing partial line, terminating it with a newline.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.pending.push(b'\n');
        let line = std::mem::take(&mut self.pending);

        let mut sink = lock(&self.sink);
        sink.write_all(&self.prefix)?;
        sink.write_all(&line)?;
        sink.flush()
    }
}

impl PrefixWriter {
    // Output without newlines (progress bars, binary data) must not pile up.
    fn break_long_line(&mut self) -> io::Result<()> {
        if self.pending.len() >= self.max_pending {
            self.finish()?;
        }
        Ok(())
    }
}

impl Write for PrefixWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            self.pending.extend_from_slice(buf);
            self.break_long_line()?;
            return Ok(buf.len());
        };

        let (complete, rest) = buf.split_at(last_newline + 1);

        let mut out = Vec::with_capacity(complete.len() + self.pending.len() + self.prefix.len() * 2);
        let mut line_start = true;
        for segment in complete.split_inclusive(|b| *b == b'\n') {
            out.extend_from_slice(&self.prefix);
            if line_start {
                out.append(&mut self.pending);
                line_start = false;
            }
            out.extend_from_slice(segment);
        }

        {
            let mut sink = lock(&self.sink);
            sink.write_all(&out)?;
            sink.flush()?;
        }

        self.pending.extend_from_slice(rest);
        self.break_long_line()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.sink).flush()
    }
}

impl Drop for PrefixWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
