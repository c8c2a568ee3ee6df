use crate::model::ObjectSet;
use crate::pipeline::traits::Analysis;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, instrument, warn};

/// Signals the completion barrier when dropped, so a task that panics still
/// arrives exactly once.
struct Arrival {
    arrivals: Arc<Semaphore>,
}

impl Drop for Arrival {
    fn drop(&mut self) {
        self.arrivals.add_permits(1);
    }
}

/// Runs analyses as independent tasks and waits for all of them.
///
/// Each spawned task gets its own bounded channel. Completion is tracked
/// with a counting barrier: every task adds one permit on exit and
/// [`AnalysisExecutor::wait`] acquires as many permits as tasks were spawned.
pub struct AnalysisExecutor {
    arrivals: Arc<Semaphore>,
    spawned: u32,
    failed: Arc<AtomicUsize>,
    channel_capacity: usize,
}

impl AnalysisExecutor {
    /// `channel_capacity` is clamped to at least 1.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            arrivals: Arc::new(Semaphore::new(0)),
            spawned: 0,
            failed: Arc::new(AtomicUsize::new(0)),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Starts `analysis` on its own task and returns the sending half of its
    /// inbox. Dropping every returned sender closes the inboxes.
    pub fn spawn(&mut self, mut analysis: Box<dyn Analysis>) -> mpsc::Sender<Arc<ObjectSet>> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let arrival = Arrival {
            arrivals: Arc::clone(&self.arrivals),
        };
        let failed = Arc::clone(&self.failed);
        self.spawned += 1;

        tokio::spawn(async move {
            let _arrival = arrival;
            let name = analysis.name().to_string();
            info!(analysis = %name, "Analysis started");

            match analysis.run(rx).await {
                Ok(()) => info!(analysis = %name, "Analysis finished"),
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    warn!(analysis = %name, error = %e, "Analysis failed");
                }
            }
        });

        tx
    }

    pub fn spawned(&self) -> usize {
        self.spawned as usize
    }

    /// Blocks until every spawned analysis has exited. Returns how many of
    /// them reported an error.
    #[instrument(skip(self), fields(tasks = self.spawned))]
    pub async fn wait(self) -> usize {
        // The semaphore is never closed, so acquisition cannot fail.
        if let Ok(permits) = self.arrivals.acquire_many(self.spawned).await {
            permits.forget();
        }
        self.failed.load(Ordering::Relaxed)
    }
}
