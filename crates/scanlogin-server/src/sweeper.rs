//! Periodic eviction of expired sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::SessionStore;

/// Background task that removes sessions once their grace period is over.
#[derive(Debug)]
pub struct SessionSweeper {
    sessions: Arc<SessionStore>,
    interval: Duration,
    grace: chrono::Duration,
    cancel: CancellationToken,
}

impl SessionSweeper {
    pub fn new(
        sessions: Arc<SessionStore>,
        interval: Duration,
        grace: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sessions,
            interval,
            grace: chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX),
            cancel,
        }
    }

    /// Run the sweep loop on the runtime until the token is cancelled.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.interval, "session sweeper started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
        info!("session sweeper stopped");
    }

    /// Evict everything that is past its grace period right now.
    pub async fn sweep_once(&self) -> usize {
        let evicted = self.sessions.evict_expired(Utc::now(), self.grace).await;
        debug!(evicted, "sweep finished");
        evicted
    }
}
