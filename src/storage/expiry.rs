//! Background Expiry Sweeper
//!
//! Lazy expiry only reclaims a key when something reads it. A key that
//! expires and is never touched again would otherwise sit in memory for
//! good, so this task asks every shard to run [`Shard::sweep`] on a fixed
//! interval.
//!
//! The sweep itself is just another job on each shard's queue. It runs
//! serialized with that shard's commands and never needs a lock.
//!
//! [`Shard::sweep`]: super::shard::Shard::sweep

use super::engine::Engine;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts sweeping `engine` every `interval`.
    ///
    /// The sweeper runs until the returned handle is dropped or a shard
    /// executor goes away.
    pub fn start(engine: Engine, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, interval, shutdown_rx));

        info!(interval_ms = interval.as_millis() as u64, "expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            debug!("expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(engine: Engine, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        match engine.sweep().await {
            Ok(0) => trace!("sweep found nothing to expire"),
            Ok(expired) => debug!(expired, "expired keys cleaned up"),
            Err(err) => {
                warn!(error = %err, "expiry sweeper stopping");
                return;
            }
        }
    }
}
