//! Capture of `tracing` output for assertions.
//!
//! Reports from worker threads go to the global subscriber, so capture
//! installs one process-wide. Call [`capture_logs`] at the start of each
//! test that asserts on logs and search for something unique to the test,
//! such as a call ID or module name, since tests in one binary share the
//! buffer.

use std::io;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing_subscriber::EnvFilter;

static BUFFER: OnceLock<Arc<Mutex<Vec<u8>>>> = OnceLock::new();

/// Handle to the process-wide captured log buffer.
#[derive(Debug, Clone)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Everything captured so far.
    #[must_use]
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Captured lines containing every one of `needles`.
    #[must_use]
    pub fn lines_with(&self, needles: &[&str]) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| needles.iter().all(|n| line.contains(n)))
            .map(str::to_owned)
            .collect()
    }

    /// Whether any captured line contains every one of `needles`.
    #[must_use]
    pub fn contains_line(&self, needles: &[&str]) -> bool {
        !self.lines_with(needles).is_empty()
    }
}

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Install the capturing subscriber (once per process) and return a handle.
///
/// If another global subscriber was installed first, nothing is captured.
#[must_use]
pub fn capture_logs() -> LogCapture {
    let buffer = BUFFER.get_or_init(|| {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(move || BufferWriter(Arc::clone(&writer)))
            .with_ansi(false)
            .with_thread_names(true)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
        buffer
    });
    LogCapture {
        buffer: Arc::clone(buffer),
    }
}
