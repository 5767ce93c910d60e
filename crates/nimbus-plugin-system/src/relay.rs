//! Forwarding plugin output to the host's output sink

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

type Sink = Box<dyn Write + Send>;

/// Shared handle to the host's output sink.
///
/// Every chunk is written and flushed before `relay` returns, so bytes reach
/// the sink in the order they were handed over.
#[derive(Clone)]
pub struct OutputRelay {
    sink: Arc<Mutex<Sink>>,
}

impl OutputRelay {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Relay to the process's stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn relay(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut sink = self.lock();
        sink.write_all(bytes)?;
        sink.flush()
    }

    /// Relay whole lines, each terminated by `\n`
    pub fn relay_lines(&self, lines: &[String]) -> io::Result<()> {
        let mut sink = self.lock();
        for line in lines {
            sink.write_all(line.as_bytes())?;
            sink.write_all(b"\n")?;
        }
        sink.flush()
    }

    fn lock(&self) -> MutexGuard<'_, Sink> {
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for OutputRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRelay").finish_non_exhaustive()
    }
}

/// In-memory sink whose contents can be inspected while it is shared
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .map(|bytes| bytes.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
