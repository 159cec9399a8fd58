// Dispatcher: the single owner of the subscription table
//
// Every registration, removal and publish goes through one bounded request
// queue and is applied here, one request at a time. Nothing else touches the
// table, so it needs no lock.
use crate::schema::SchemaRegistry;
use crate::subscriber::Delivery;
use crate::telemetry::{BusStats, DeliveryCounters};
use crate::value::{types_of, ArgType, Value};
use crate::{BusError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dispatcher-side record of a live subscription.
pub(crate) struct Entry {
    pub(crate) id: u64,
    pub(crate) once: bool,
    pub(crate) signature: Option<Vec<ArgType>>,
    pub(crate) delivery: Delivery,
    pub(crate) worker: JoinHandle<()>,
}

pub(crate) enum Request {
    Add {
        topic: String,
        entry: Entry,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        topic: String,
        id: u64,
    },
    Publish {
        topic: String,
        args: Vec<Value>,
        reply: oneshot::Sender<Result<()>>,
    },
    Stats {
        reply: oneshot::Sender<BusStats>,
    },
    Count {
        topic: String,
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Dispatcher {
    requests: mpsc::Receiver<Request>,
    // Topic -> subscriptions in registration order
    table: HashMap<String, Vec<Entry>>,
    schema: Option<SchemaRegistry>,
    counters: Arc<DeliveryCounters>,
    // Workers whose channel is closed but which may still be draining
    retired: Vec<JoinHandle<()>>,
    published: u64,
    rejected: u64,
    enqueued: u64,
}

impl Dispatcher {
    pub(crate) fn new(
        requests: mpsc::Receiver<Request>,
        schema: Option<SchemaRegistry>,
        counters: Arc<DeliveryCounters>,
    ) -> Self {
        Self {
            requests,
            table: HashMap::new(),
            schema,
            counters,
            retired: Vec::new(),
            published: 0,
            rejected: 0,
            enqueued: 0,
        }
    }

    /// Request loop. Ends on a shutdown request or when every bus handle is gone.
    pub(crate) async fn run(mut self) {
        info!(target: "dispatcher", checked = self.schema.is_some(), "Dispatcher started");

        while let Some(request) = self.requests.recv().await {
            match request {
                Request::Add { topic, entry, reply } => {
                    let res = self.add_subscription(topic, entry);
                    let _ = reply.send(res);
                }
                Request::Remove { topic, id } => self.remove_subscription(&topic, id),
                Request::Publish { topic, args, reply } => {
                    let res = self.publish(&topic, args);
                    let _ = reply.send(res);
                }
                Request::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
                Request::Count { topic, reply } => {
                    let _ = reply.send(self.table.get(&topic).map_or(0, Vec::len));
                }
                Request::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    info!(target: "dispatcher", "Dispatcher shut down");
                    return;
                }
            }
        }

        // All bus handles dropped: close channels and let workers finish on their own.
        let live = self.table.drain().map(|(_, entries)| entries.len()).sum::<usize>();
        info!(target: "dispatcher", live, "Request queue closed; dispatcher stopping");
    }

    fn add_subscription(&mut self, topic: String, entry: Entry) -> Result<()> {
        if let Err(err) = self.verify_listener(&topic, entry.signature.as_deref()) {
            self.rejected += 1;
            debug!(target: "dispatcher", subscription = entry.id, topic = %topic, error = %err, "Rejected subscription");
            // dropping the entry closes its channel, so the worker exits
            return Err(err);
        }
        debug!(target: "dispatcher", subscription = entry.id, topic = %topic, once = entry.once, "Added subscription");
        self.table.entry(topic).or_default().push(entry);
        Ok(())
    }

    fn verify_listener(&self, topic: &str, signature: Option<&[ArgType]>) -> Result<()> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };
        if schema.declared(topic).is_none() {
            return Err(BusError::UnknownTopic(topic.to_string()));
        }
        let signature = signature.ok_or_else(|| BusError::InvalidListener {
            topic: topic.to_string(),
        })?;
        schema.check(topic, signature)
    }

    fn remove_subscription(&mut self, topic: &str, id: u64) {
        let Some(entries) = self.table.get_mut(topic) else {
            debug!(target: "dispatcher", subscription = id, topic = %topic, "Unsubscribe for unknown topic ignored");
            return;
        };
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            debug!(target: "dispatcher", subscription = id, topic = %topic, "Unsubscribe for unknown subscription ignored");
            return;
        };
        let entry = entries.remove(pos);
        if entries.is_empty() {
            self.table.remove(topic);
        }
        debug!(target: "dispatcher", subscription = id, topic = %topic, "Removed subscription");
        self.retire(entry);
    }

    fn publish(&mut self, topic: &str, args: Vec<Value>) -> Result<()> {
        if let Some(schema) = &self.schema {
            if let Err(err) = schema.check(topic, &types_of(&args)) {
                self.rejected += 1;
                debug!(target: "dispatcher", topic = %topic, error = %err, "Rejected publish");
                return Err(err);
            }
        }
        self.published += 1;

        let Some(entries) = self.table.remove(topic) else {
            debug!(target: "dispatcher", topic = %topic, "No subscriptions for topic");
            return Ok(());
        };

        let mut keep = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.delivery.send(args.clone()).is_err() {
                warn!(target: "dispatcher", subscription = entry.id, topic = %topic, "Worker gone; dropping subscription");
                continue;
            }
            self.enqueued += 1;
            if entry.once {
                debug!(target: "dispatcher", subscription = entry.id, topic = %topic, "Once subscription fired");
                self.retire(entry);
            } else {
                keep.push(entry);
            }
        }
        if !keep.is_empty() {
            self.table.insert(topic.to_string(), keep);
        }
        Ok(())
    }

    /// Closes an entry's channel and keeps its worker handle for shutdown.
    fn retire(&mut self, entry: Entry) {
        let Entry {
            delivery, worker, ..
        } = entry;
        drop(delivery);
        self.retired.retain(|h| !h.is_finished());
        self.retired.push(worker);
    }

    fn stats(&self) -> BusStats {
        BusStats {
            total_published: self.published,
            total_rejected: self.rejected,
            total_enqueued: self.enqueued,
            total_delivered: self.counters.delivered(),
            total_failed: self.counters.failed(),
            active_subscriptions: self.table.values().map(Vec::len).sum(),
            topics: self.table.len(),
        }
    }

    async fn shutdown(&mut self) {
        let entries: Vec<Entry> = self.table.drain().flat_map(|(_, v)| v).collect();
        info!(target: "dispatcher", live = entries.len(), "Closing subscriptions");
        for entry in entries {
            self.retire(entry);
        }
        for worker in self.retired.drain(..) {
            if let Err(e) = worker.await {
                warn!(target: "dispatcher", error = %e, "Subscriber worker ended abnormally");
            }
        }
    }
}
