//! Serialized access to the printer sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use wsprint_printer::{PrintError, PrintJob, PrinterSink};

/// Cloneable handle to the single printer shared by all sessions.
///
/// Jobs run one at a time, in lock acquisition order. The same timeout
/// bounds both the wait for the printer and the print call. A timed-out job
/// is dropped, which kills any driver child process it spawned.
#[derive(Clone)]
pub struct SharedPrinter {
    sink: Arc<dyn PrinterSink>,
    lock: Arc<Mutex<()>>,
    timeout: Duration,
}

impl SharedPrinter {
    pub fn new(sink: Arc<dyn PrinterSink>, timeout: Duration) -> Self {
        Self {
            sink,
            lock: Arc::new(Mutex::new(())),
            timeout,
        }
    }

    /// Backend name for logs.
    pub fn name(&self) -> &str {
        self.sink.name()
    }

    /// Prints `job`, waiting for any job already in flight.
    pub async fn print(&self, job: PrintJob) -> Result<(), PrintError> {
        let _guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(document = %job.document_name, "printer busy, job queued");
                let started = tokio::time::Instant::now();
                let guard = tokio::time::timeout(self.timeout, self.lock.lock())
                    .await
                    .map_err(|_| PrintError::Busy(self.timeout))?;
                tracing::debug!(
                    document = %job.document_name,
                    waited = ?started.elapsed(),
                    "printer acquired"
                );
                guard
            }
        };
        match tokio::time::timeout(self.timeout, self.sink.print(job)).await {
            Ok(result) => result,
            Err(_) => Err(PrintError::Timeout(self.timeout)),
        }
    }
}

impl std::fmt::Debug for SharedPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPrinter")
            .field("sink", &self.sink.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
