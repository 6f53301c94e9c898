//! Reaper - periodic removal of expired terminated records.
//!
//! Terminated instances stay listable for `terminated_ttl_secs` so callers
//! can observe the final state, then the reaper deletes them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use harness_core::config::RetentionConfig;
use harness_core::event::{events, EventEmitter, InstanceEvent};

use crate::registry::InstanceRegistry;

/// Statistics about the reaper.
#[derive(Debug, Clone, Default)]
pub struct ReaperStats {
    /// Number of sweeps run.
    pub sweeps: u64,
    /// Total number of records deleted.
    pub total_reaped: u64,
}

/// Background sweeper for terminated records.
///
/// # Usage
///
/// ```ignore
/// let reaper = Reaper::start(registry, retention, emitter);
/// // ... serve ...
/// reaper.shutdown().await;
/// ```
pub struct Reaper {
    stats: Arc<Mutex<ReaperStats>>,
    handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Reaper {
    /// Start sweeping every `sweep_interval_secs`.
    pub fn start(
        registry: Arc<InstanceRegistry>,
        config: RetentionConfig,
        event_emitter: EventEmitter,
    ) -> Self {
        let stats = Arc::new(Mutex::new(ReaperStats::default()));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let loop_stats = Arc::clone(&stats);
        let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
        let ttl = config.terminated_ttl_secs;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("Reaper loop shutting down");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        let reaped = Self::reap_expired(&registry, &event_emitter, ttl);
                        let mut s = loop_stats.lock();
                        s.sweeps += 1;
                        s.total_reaped += reaped as u64;
                    }
                }
            }
        });

        tracing::info!(
            terminated_ttl_secs = ttl,
            sweep_interval_secs = interval.as_secs(),
            "Reaper started"
        );

        Self {
            stats,
            handle: Some(handle),
            shutdown_tx,
        }
    }

    /// Delete terminated records older than `ttl_secs`, returning how many
    /// were removed.
    pub fn reap_expired(
        registry: &InstanceRegistry,
        event_emitter: &EventEmitter,
        ttl_secs: u64,
    ) -> usize {
        // A TTL too large to represent never expires anything.
        let Some(cutoff) = chrono::Duration::from_std(Duration::from_secs(ttl_secs))
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return 0;
        };

        let reaped = registry.reap_terminated(cutoff);
        for instance in &reaped {
            tracing::debug!(instance_id = %instance.id, "Reaped terminated instance");
            event_emitter.emit(InstanceEvent::new(events::INSTANCE_REAPED, instance));
        }
        if !reaped.is_empty() {
            tracing::info!(count = reaped.len(), "Reaped terminated instances");
        }
        reaped.len()
    }

    /// Current statistics.
    pub fn stats(&self) -> ReaperStats {
        self.stats.lock().clone()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        tracing::info!("Reaper stopped");
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
