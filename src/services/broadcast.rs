//! Change fan-out to WebSocket observers.
//!
//! One [`Topic`] exists per process. Writers hand it events through
//! [`ChangeNotifier::notify`]; every registered [`Subscription`] receives
//! each event, in publish order, on its own bounded queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::event::ChangeEvent;
use crate::services::metrics::{BROADCASTS_COUNTER, EVICTIONS_COUNTER, SUBSCRIBERS_GAUGE};

pub const SHAPES_TOPIC: &str = "shapes_updates";

/// The narrow seam between the write path and the fan-out. Must not block and
/// must not fail the caller.
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, event: ChangeEvent);
}

type Outbox = mpsc::Sender<Arc<ChangeEvent>>;

pub struct Topic {
    name: String,
    queue_size: usize,
    members: RwLock<HashMap<Uuid, Outbox>>,
    /// Held for the whole of one publish so every member sees the same order.
    /// Counts events published so far.
    publish: Mutex<u64>,
    closed: AtomicBool,
}

impl Topic {
    pub fn new(name: impl Into<String>, queue_size: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            queue_size: queue_size.max(1),
            members: RwLock::new(HashMap::new()),
            publish: Mutex::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a new member. `None` once the topic has been closed.
    pub fn subscribe(self: &Arc<Self>) -> Option<Subscription> {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let id = Uuid::new_v4();
        {
            let mut members = self.members.write();
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            members.insert(id, tx);
            SUBSCRIBERS_GAUGE.set(members.len() as f64);
        }
        debug!(topic = %self.name, subscriber = %id, "registered");
        Some(Subscription {
            id,
            topic: Arc::clone(self),
            rx,
        })
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_member(&self, id: &Uuid) -> bool {
        self.members.read().contains_key(id)
    }

    /// Total events published since start.
    pub fn published(&self) -> u64 {
        *self.publish.lock()
    }

    /// Deregister everyone and refuse new members. Open subscriptions drain
    /// what was already queued, then end.
    pub fn close(&self) {
        let mut members = self.members.write();
        self.closed.store(true, Ordering::Release);
        let count = members.len();
        members.clear();
        SUBSCRIBERS_GAUGE.set(0.0);
        info!(topic = %self.name, "closed, released {count} subscriber(s)");
    }

    fn deregister(&self, id: &Uuid) {
        let mut members = self.members.write();
        if members.remove(id).is_some() {
            SUBSCRIBERS_GAUGE.set(members.len() as f64);
            debug!(topic = %self.name, subscriber = %id, "deregistered");
        }
    }
}

impl ChangeNotifier for Topic {
    fn notify(&self, event: ChangeEvent) {
        let action = event.action();
        let event = Arc::new(event);

        let mut published = self.publish.lock();
        *published += 1;

        // Snapshot, then deliver without the membership lock.
        let targets: Vec<(Uuid, Outbox)> = self
            .members
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut evicted = Vec::new();
        for (id, tx) in &targets {
            match tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(topic = %self.name, subscriber = %id, "queue full, evicting slow subscriber");
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*id),
            }
        }

        if !evicted.is_empty() {
            let mut members = self.members.write();
            for id in &evicted {
                members.remove(id);
            }
            SUBSCRIBERS_GAUGE.set(members.len() as f64);
            EVICTIONS_COUNTER.inc_by(evicted.len() as f64);
        }
        drop(published);

        BROADCASTS_COUNTER.with_label_values(&[action]).inc();
        debug!(
            topic = %self.name,
            action,
            shape_id = event.shape_id(),
            delivered = targets.len() - evicted.len(),
            "broadcast"
        );
    }
}

/// Membership of one connection. Dropping it deregisters immediately.
pub struct Subscription {
    id: Uuid,
    topic: Arc<Topic>,
    rx: mpsc::Receiver<Arc<ChangeEvent>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.topic.is_member(&self.id)
    }

    /// Next event; `None` once evicted or the topic is closed and the queue
    /// is drained.
    pub async fn recv(&mut self) -> Option<Arc<ChangeEvent>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.topic.deregister(&self.id);
    }
}
