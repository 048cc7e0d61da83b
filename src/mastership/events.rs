//! # Mastership Events
//!
//! Events are created only when the master of a resource actually changes.
//! Standby and unusable pool changes never produce an event.
//!
//! The bus fans events out to subscribers (protocol adapters) over unbounded
//! channels. Delivery is best-effort: closed subscribers are pruned on publish.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::types::NodeId;

/// Event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MastershipEventType {
    /// A (new) master now controls the resource
    MasterChanged,

    /// The resource was left without any master
    MasterVacated,
}

impl MastershipEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MasterChanged => "MASTER_CHANGED",
            Self::MasterVacated => "MASTER_VACATED",
        }
    }
}

/// A change of master for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MastershipEvent<R> {
    #[serde(rename = "type")]
    pub event_type: MastershipEventType,
    pub resource: R,

    /// `None` only for [`MastershipEventType::MasterVacated`]
    pub new_master: Option<NodeId>,
}

impl<R> MastershipEvent<R> {
    pub fn master_changed(resource: R, new_master: NodeId) -> Self {
        Self {
            event_type: MastershipEventType::MasterChanged,
            resource,
            new_master: Some(new_master),
        }
    }

    pub fn master_vacated(resource: R) -> Self {
        Self {
            event_type: MastershipEventType::MasterVacated,
            resource,
            new_master: None,
        }
    }

    pub fn is_master_changed(&self) -> bool {
        self.event_type == MastershipEventType::MasterChanged
    }
}

/// Event sender for a subscriber
pub type EventSender<R> = mpsc::UnboundedSender<MastershipEvent<R>>;

/// Event receiver for a subscriber
pub type EventReceiver<R> = mpsc::UnboundedReceiver<MastershipEvent<R>>;

/// Delivers mastership events to interested subsystems.
#[derive(Debug)]
pub struct MastershipEventBus<R> {
    subscribers: RwLock<Vec<EventSender<R>>>,
    published: AtomicU64,
}

impl<R: Clone> Default for MastershipEventBus<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone> MastershipEventBus<R> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Register a subscriber. Events published afterwards are delivered to it.
    pub fn subscribe(&self) -> EventReceiver<R> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: MastershipEvent<R>) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Total events published since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
