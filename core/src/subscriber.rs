// Subscriber workers: one delivery task per subscription
use crate::callback::{Callback, DeliveryFailure};
use crate::telemetry::DeliveryCounters;
use crate::value::Value;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Handle to a registered callback, returned by `once`/`on` and passed back
/// to `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) topic: String,
    pub(crate) once: bool,
}

impl Subscription {
    /// Bus-unique identity of this subscription.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// True for subscriptions that are removed after their first delivery.
    pub fn is_once(&self) -> bool {
        self.once
    }
}

/// Sending half of a worker's delivery channel. Dropping it closes the
/// channel; the worker drains what is queued and exits.
pub(crate) type Delivery = mpsc::UnboundedSender<Vec<Value>>;

/// Spawns the delivery task for one subscription.
///
/// Each invocation runs on Tokio's blocking pool, one at a time, so a callback
/// that blocks never stalls the dispatcher or other workers.
pub(crate) fn spawn_worker(
    id: u64,
    topic: String,
    mut callback: Callback,
    counters: Arc<DeliveryCounters>,
    failures: broadcast::Sender<DeliveryFailure>,
) -> (Delivery, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Value>>();

    let handle = tokio::spawn(async move {
        debug!(target: "subscriber", subscription = id, topic = %topic, "Worker started");
        while let Some(batch) = rx.recv().await {
            // callbacks may block; keep them off the async worker threads
            let invocation = tokio::task::spawn_blocking(move || {
                let outcome = callback.call(batch);
                (callback, outcome)
            })
            .await;
            let outcome = match invocation {
                Ok((returned, outcome)) => {
                    callback = returned;
                    outcome
                }
                Err(e) => {
                    error!(target: "subscriber", subscription = id, topic = %topic, error = %e, "Callback task lost");
                    break;
                }
            };
            match outcome {
                Ok(()) => counters.record_delivered(),
                Err(kind) => {
                    counters.record_failed();
                    let failure = DeliveryFailure {
                        subscription_id: id,
                        topic: topic.clone(),
                        kind,
                        occurred_at: Utc::now(),
                    };
                    warn!(target: "subscriber", subscription = id, topic = %topic, error = %failure.kind, "Delivery failed");
                    // nobody listening is fine
                    let _ = failures.send(failure);
                }
            }
        }
        debug!(target: "subscriber", subscription = id, topic = %topic, "Worker exited");
    });

    (tx, handle)
}
