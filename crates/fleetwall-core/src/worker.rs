// ── Bounded blocking worker pool ──
//
// Every remote call (SSH exec, SNMP exchange, ping, TCP connect) blocks a
// thread. They all run here: a semaphore caps how many run at once, and an
// outer timeout bounds how long a caller waits. The permit travels into the
// blocking closure, so a call that outlives its caller's timeout still
// counts against the cap until it actually returns.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::warn;

/// Why a worker call produced no value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("worker pool is closed")]
    Closed,
}

/// Cloneable handle to the shared blocking pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `f` on a blocking thread, waiting at most `timeout` for its result.
    ///
    /// Time spent queued for a permit counts against the timeout.
    pub async fn run<T, F>(&self, timeout: Duration, f: F) -> Result<T, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let job = async {
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::Closed)?;

            let mut handle = task::spawn_blocking(move || {
                let _permit = permit;
                f()
            });

            match (&mut handle).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_panic() => Err(WorkerError::Panicked(e.to_string())),
                Err(_) => Err(WorkerError::Closed),
            }
        };

        match tokio::time::timeout(timeout, job).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?timeout, "blocking call abandoned after timeout");
                Err(WorkerError::TimedOut(timeout))
            }
        }
    }

    /// Stop handing out permits. Queued and future calls fail with `Closed`.
    pub fn close(&self) {
        self.permits.close();
    }
}
