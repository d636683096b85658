// file: src/broadcast/bus.rs
// description: per-task progress fan-out to local subscribers with cross-instance broker relay

use crate::broadcast::broker::{Broker, BrokerStatus, MessageHandler};
use crate::error::Result;
use crate::models::{ProgressEvent, TaskId};
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

struct Subscriber {
    id: Uuid,
    sender: mpsc::Sender<ProgressEvent>,
}

/// Receiving end handed to one observer of one task
pub struct Subscription {
    pub id: Uuid,
    pub task_id: TaskId,
    pub receiver: mpsc::Receiver<ProgressEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BrokerEnvelope {
    origin: Uuid,
    event: ProgressEvent,
}

pub struct ProgressBus {
    /// Task id to its live subscribers. Empty sets are removed.
    subscribers: DashMap<TaskId, Vec<Subscriber>>,
    broker: Arc<dyn Broker>,
    broker_error: Option<String>,
    topic: String,
    instance_id: Uuid,
    buffer: usize,
}

impl fmt::Debug for ProgressBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressBus")
            .field("instance_id", &self.instance_id)
            .field("task_count", &self.subscribers.len())
            .field("broker", &self.broker.backend())
            .finish()
    }
}

impl ProgressBus {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>, buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            broker,
            broker_error: None,
            topic: topic.into(),
            instance_id: Uuid::new_v4(),
            buffer: buffer.max(1),
        }
    }

    pub fn with_broker_error(mut self, error: Option<String>) -> Self {
        self.broker_error = error;
        self
    }

    /// Registers a subscriber whose first event is its own connection ack.
    /// Events published before this call are not replayed.
    pub fn subscribe(&self, task_id: TaskId) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();

        // fresh channel with capacity >= 1
        let _ = sender.try_send(ProgressEvent::connection(task_id));

        self.subscribers
            .entry(task_id)
            .or_default()
            .push(Subscriber { id, sender });

        debug!("Subscriber {} joined task {}", id, task_id);
        Subscription {
            id,
            task_id,
            receiver,
        }
    }

    pub fn unsubscribe(&self, task_id: TaskId, subscriber_id: Uuid) {
        if let Some(mut subscribers) = self.subscribers.get_mut(&task_id) {
            subscribers.retain(|s| s.id != subscriber_id);
        }
        self.subscribers.remove_if(&task_id, |_, subscribers| subscribers.is_empty());
        debug!("Subscriber {} left task {}", subscriber_id, task_id);
    }

    /// Local delivery first, then relay through the broker. Broker failures
    /// are logged and never reach the publisher.
    pub async fn publish(&self, event: ProgressEvent) {
        self.deliver_local(&event);

        let envelope = BrokerEnvelope {
            origin: self.instance_id,
            event,
        };

        match serde_json::to_string(&envelope) {
            Ok(message) => {
                if let Err(e) = self.broker.publish(&self.topic, &message).await {
                    warn!("Broker relay failed for task {}: {}", envelope.event.task_id, e);
                }
            }
            Err(e) => warn!("Failed to encode progress event: {}", e),
        }
    }

    /// Sends to every subscriber registered for the event's task. A failed
    /// send removes that subscriber without affecting the others.
    pub fn deliver_local(&self, event: &ProgressEvent) -> usize {
        let targets: Vec<(Uuid, mpsc::Sender<ProgressEvent>)> = self
            .subscribers
            .get(&event.task_id)
            .map(|subs| subs.iter().map(|s| (s.id, s.sender.clone())).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} of task {} is not keeping up", id, event.task_id);
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => failed.push(id),
            }
        }

        for id in failed {
            self.unsubscribe(event.task_id, id);
        }

        delivered
    }

    /// Redelivers events relayed by other instances to local subscribers
    pub async fn attach_broker(self: &Arc<Self>) -> Result<()> {
        let bus: Weak<ProgressBus> = Arc::downgrade(self);
        let handler: MessageHandler = Arc::new(move |message: String| {
            let bus = bus.clone();
            async move {
                if let Some(bus) = bus.upgrade() {
                    bus.handle_relayed(&message);
                }
            }
            .boxed()
        });

        self.broker.subscribe(&self.topic, handler).await
    }

    fn handle_relayed(&self, message: &str) {
        match serde_json::from_str::<BrokerEnvelope>(message) {
            Ok(envelope) if envelope.origin == self.instance_id => {}
            Ok(envelope) => {
                let delivered = self.deliver_local(&envelope.event);
                debug!(
                    "Relayed event for task {} from {} to {} subscribers",
                    envelope.event.task_id, envelope.origin, delivered
                );
            }
            Err(e) => warn!("Ignoring malformed broker message: {}", e),
        }
    }

    pub fn subscriber_count(&self, task_id: TaskId) -> usize {
        self.subscribers.get(&task_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn task_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn broker_status(&self) -> BrokerStatus {
        BrokerStatus {
            enabled: self.broker.is_live(),
            backend: self.broker.backend().to_string(),
            topic: self.topic.clone(),
            error: self.broker.relay_error().or_else(|| self.broker_error.clone()),
        }
    }
}
