use crate::Cache;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long `shutdown` waits for the reaper to exit before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub(crate) struct ReaperTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Cache {
    /// Start the background TTL reaper, if enabled by configuration.
    /// Starting an already-running reaper is a no-op.
    ///
    /// The task holds only a weak handle, so dropping the cache also
    /// winds the reaper down.
    pub fn spawn_reaper(self: &Arc<Self>) {
        if !self.config().enable_auto_cleanup {
            return;
        }
        let mut guard = self.reaper.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_reaper(
            Arc::downgrade(self),
            self.config().cleanup_interval,
            shutdown_rx,
        ));
        *guard = Some(ReaperTask {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the reaper: signal it, wait up to five seconds, then abort.
    /// Idempotent. Entries are preserved; only the worker is released.
    pub async fn shutdown(&self) {
        let task = self.reaper.lock().unwrap().take();
        let Some(ReaperTask {
            shutdown_tx,
            handle,
        }) = task
        else {
            return;
        };

        let _ = shutdown_tx.send(true);
        let abort = handle.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            tracing::warn!("cache reaper did not stop in time; aborting it");
            abort.abort();
        }
    }
}

async fn run_reaper(cache: Weak<Cache>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticks.tick().await; // Discard the immediate first tick.

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!("cache reaper stopping");
                break;
            }
            _ = ticks.tick() => {
                let Some(cache) = cache.upgrade() else { break };
                let removed = cache.remove_expired();
                cache.record_cleanup_cycle();
                if removed > 0 {
                    tracing::debug!(removed, "reaper cycle removed expired entries");
                }
            }
        }
    }
}
