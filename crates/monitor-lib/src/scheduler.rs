//! Fixed-interval collection scheduling
//!
//! Drives the collector on a fixed tick. Ticks that fire while a cycle
//! is still running are dropped, not queued, so a slow cycle can never
//! build a backlog of triggers. Shutdown is cooperative: an in-flight
//! cycle runs to completion before the loop exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::collector::Collector;

pub struct Scheduler {
    collector: Arc<Collector>,
    interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(collector: Arc<Collector>, interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            collector,
            interval,
            shutdown_tx,
            handle: None,
        }
    }

    /// Spawn the collection loop. The first cycle runs immediately.
    pub fn start(&mut self) {
        let collector = Arc::clone(&self.collector);
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "collection loop started");

            let mut ticker = tokio::time::interval(interval);
            // Late ticks are dropped, never bursted to catch up
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Shutdown is only observed between cycles
                        collector.run_cycle().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("collection loop stopping");
                        break;
                    }
                }
            }
        });

        self.handle = Some(handle);
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(&mut self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("collection loop already gone");
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "collection loop task ended abnormally");
            }
        }
    }
}
