// Logging setup and bus statistics
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Snapshot of bus activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Posts accepted by the dispatcher.
    pub total_published: u64,
    /// Posts and registrations refused by schema validation.
    pub total_rejected: u64,
    /// Argument batches handed to subscriber workers.
    pub total_enqueued: u64,
    /// Batches a callback completed without failure.
    pub total_delivered: u64,
    /// Batches that ended in a delivery failure.
    pub total_failed: u64,
    pub active_subscriptions: usize,
    /// Topics with at least one live subscription.
    pub topics: usize,
}

/// Counters written by subscriber workers, read by the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryCounters {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(target: "telemetry", "Logging initialized");
    }
}
