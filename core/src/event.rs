// Event bus facade
use crate::callback::{DeliveryFailure, IntoCallback};
use crate::config::BusConfig;
use crate::dispatcher::{Dispatcher, Entry, Request};
use crate::subscriber::{spawn_worker, Subscription};
use crate::telemetry::{BusStats, DeliveryCounters};
use crate::value::{ArgType, IntoArgs};
use crate::{BusError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

/// Asynchronous publish/subscribe bus.
///
/// Callbacks registered with [`on`](Self::on) or [`once`](Self::once) run on
/// their own worker task, so `post` returns as soon as the dispatcher has
/// accepted (and, on a checked bus, validated) the message. Handles are cheap
/// to clone; the dispatcher stops when [`shutdown`](Self::shutdown) is called
/// or the last handle is dropped.
///
/// Callbacks run on Tokio's blocking pool, one invocation at a time per
/// subscription, so a blocking callback delays only its own subscription.
#[derive(Clone)]
pub struct EventBus {
    requests: mpsc::Sender<Request>,
    failures: broadcast::Sender<DeliveryFailure>,
    counters: Arc<DeliveryCounters>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Creates a bus and starts its dispatcher. Must be called inside a Tokio runtime.
    pub async fn new(config: BusConfig) -> Result<Self> {
        config.validate()?;

        let (requests, rx) = mpsc::channel(config.queue_length);
        let (failures, _) = broadcast::channel(config.failure_buffer);
        let counters = Arc::new(DeliveryCounters::default());

        info!(
            target: "event_bus",
            queue_length = config.queue_length,
            checked = config.schema.is_some(),
            "Event Bus started"
        );
        tokio::spawn(Dispatcher::new(rx, config.schema, counters.clone()).run());

        Ok(Self {
            requests,
            failures,
            counters,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Unchecked bus with the default queue length.
    pub async fn with_defaults() -> Result<Self> {
        Self::new(BusConfig::default()).await
    }

    /// Registers a callback that receives at most one message.
    pub async fn once<P, C>(&self, topic: &str, callback: C) -> Result<Subscription>
    where
        C: IntoCallback<P>,
    {
        self.register(topic, callback, true).await
    }

    /// Registers a callback that receives every message until unsubscribed.
    pub async fn on<P, C>(&self, topic: &str, callback: C) -> Result<Subscription>
    where
        C: IntoCallback<P>,
    {
        self.register(topic, callback, false).await
    }

    async fn register<P, C>(&self, topic: &str, callback: C, once: bool) -> Result<Subscription>
    where
        C: IntoCallback<P>,
    {
        let callback = callback.into_callback();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let signature = callback.signature().map(<[ArgType]>::to_vec);
        let (delivery, worker) = spawn_worker(
            id,
            topic.to_string(),
            callback,
            self.counters.clone(),
            self.failures.clone(),
        );

        let (reply, verdict) = oneshot::channel();
        self.submit(Request::Add {
            topic: topic.to_string(),
            entry: Entry {
                id,
                once,
                signature,
                delivery,
                worker,
            },
            reply,
        })
        .await?;
        verdict.await.map_err(|_| BusError::Closed)??;

        debug!(target: "event_bus", subscription = id, topic = %topic, once, "Subscribed");
        Ok(Subscription {
            id,
            topic: topic.to_string(),
            once,
        })
    }

    /// Publishes `args` to every subscription of `topic`.
    ///
    /// Returns once the dispatcher has accepted the message; delivery happens
    /// later and its failures are reported through [`failures`](Self::failures).
    pub async fn post(&self, topic: &str, args: impl IntoArgs) -> Result<()> {
        let (reply, verdict) = oneshot::channel();
        self.submit(Request::Publish {
            topic: topic.to_string(),
            args: args.into_args(),
            reply,
        })
        .await?;
        verdict.await.map_err(|_| BusError::Closed)?
    }

    /// Removes a subscription from the topic it was registered on. Waits only
    /// for the request to be queued; unknown or already removed subscriptions
    /// are ignored.
    ///
    /// The lookup always uses the handle's own topic; `topic` is only checked
    /// for a mismatch, which is logged.
    pub async fn unsubscribe(&self, topic: &str, subscription: &Subscription) -> Result<()> {
        if topic != subscription.topic {
            debug!(
                target: "event_bus",
                subscription = subscription.id,
                given = %topic,
                registered = %subscription.topic,
                "Unsubscribe topic differs from subscription topic"
            );
        }
        self.submit(Request::Remove {
            topic: subscription.topic.clone(),
            id: subscription.id,
        })
        .await
    }

    /// Number of live subscriptions on `topic`, as seen by the dispatcher.
    pub async fn subscriber_count(&self, topic: &str) -> Result<usize> {
        let (reply, answer) = oneshot::channel();
        self.submit(Request::Count {
            topic: topic.to_string(),
            reply,
        })
        .await?;
        answer.await.map_err(|_| BusError::Closed)
    }

    pub async fn stats(&self) -> Result<BusStats> {
        let (reply, answer) = oneshot::channel();
        self.submit(Request::Stats { reply }).await?;
        answer.await.map_err(|_| BusError::Closed)
    }

    /// Receiver for delivery failures raised after this call.
    pub fn failures(&self) -> broadcast::Receiver<DeliveryFailure> {
        self.failures.subscribe()
    }

    /// Closes every subscription, waits for all workers to finish their queued
    /// deliveries, and stops the dispatcher. Later calls return [`BusError::Closed`].
    pub async fn shutdown(&self) -> Result<()> {
        info!(target: "event_bus", "Event Bus shutting down");
        let (reply, done) = oneshot::channel();
        self.submit(Request::Shutdown { reply }).await?;
        done.await.map_err(|_| BusError::Closed)
    }

    async fn submit(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| BusError::Closed)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("closed", &self.requests.is_closed())
            .finish()
    }
}
