//! Sweeper component for stuck item recovery.
//!
//! The sweeper periodically moves items that have sat in the processing set
//! longer than the configured age back to pending, so work abandoned by a
//! crashed or stalled worker is picked up again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::{Backend, SharedBackend};
use crate::client::Client;
use crate::config::SweeperConfig;
use crate::error::Result;
use crate::item::now_millis;

/// Sweeper that requeues stuck items of one queue.
pub struct Sweeper<B: Backend + Clone = SharedBackend> {
    client: Client<B>,
    config: SweeperConfig,
    running: Arc<AtomicBool>,
}

impl<B: Backend + Clone + 'static> Sweeper<B> {
    /// Create a new sweeper.
    pub fn new(client: Client<B>, config: SweeperConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            client,
            config,
            running,
        }
    }

    /// Run the sweep loop.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(queue = %self.config.queue, "Sweeper started");

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.sweep().await {
                tracing::error!(queue = %self.config.queue, error = %e, "Sweep failed");
            }
        }

        tracing::info!(queue = %self.config.queue, "Sweeper stopped");
        Ok(())
    }

    /// Requeue everything claimed more than `stuck_after` ago. Returns the
    /// number of items moved.
    pub async fn sweep(&self) -> Result<usize> {
        let age = i64::try_from(self.config.stuck_after.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis().saturating_sub(age);
        let moved = self.client.requeue(&self.config.queue, Some(cutoff)).await?;

        if moved == 0 {
            tracing::trace!(queue = %self.config.queue, "No stuck items");
        }
        Ok(moved)
    }
}
