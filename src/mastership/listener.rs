//! Remote Change Propagation
//!
//! Every coordinator subscribes to the store's master map. Mutations made by
//! any node, the local one included, arrive here and are translated into
//! events on the local bus:
//! - Added    → MASTER_CHANGED
//! - Replaced → MASTER_CHANGED
//! - Removed  → MASTER_VACATED (when enabled)

use std::sync::Arc;

use tracing::debug;

use super::events::{MastershipEvent, MastershipEventBus};
use super::store::{MasterChange, MasterChangeKind, MasterChangeListener};
use super::types::ResourceKey;

/// Bridges store notifications onto a [`MastershipEventBus`].
#[derive(Debug)]
pub struct RemoteChangeListener<R> {
    bus: Arc<MastershipEventBus<R>>,
    notify_on_removal: bool,
}

impl<R: ResourceKey> RemoteChangeListener<R> {
    pub fn new(bus: Arc<MastershipEventBus<R>>, notify_on_removal: bool) -> Self {
        Self {
            bus,
            notify_on_removal,
        }
    }

    /// Event to publish for `change`, if any.
    pub fn translate(&self, change: &MasterChange<R>) -> Option<MastershipEvent<R>> {
        match change.kind() {
            MasterChangeKind::Added | MasterChangeKind::Replaced => change
                .new
                .clone()
                .map(|master| MastershipEvent::master_changed(change.resource.clone(), master)),
            MasterChangeKind::Removed if self.notify_on_removal => {
                Some(MastershipEvent::master_vacated(change.resource.clone()))
            }
            MasterChangeKind::Removed | MasterChangeKind::Unchanged => None,
        }
    }
}

impl<R: ResourceKey> MasterChangeListener<R> for RemoteChangeListener<R> {
    fn on_master_change(&self, change: &MasterChange<R>) {
        if let Some(event) = self.translate(change) {
            debug!(
                resource = %change.resource,
                old = ?change.old,
                new = ?change.new,
                event = event.event_type.as_str(),
                "master map changed"
            );
            self.bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastership::events::MastershipEventType;
    use crate::mastership::types::{DeviceId, NodeId};

    fn change(old: Option<&str>, new: Option<&str>) -> MasterChange<DeviceId> {
        MasterChange {
            resource: DeviceId::from("of:1"),
            old: old.map(NodeId::from),
            new: new.map(NodeId::from),
        }
    }

    #[test]
    fn test_add_and_replace_publish_master_changed() {
        let bus = Arc::new(MastershipEventBus::new());
        let mut rx = bus.subscribe();
        let listener = RemoteChangeListener::new(Arc::clone(&bus), false);

        listener.on_master_change(&change(None, Some("a")));
        listener.on_master_change(&change(Some("a"), Some("b")));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.new_master, Some(NodeId::from("a")));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.event_type, MastershipEventType::MasterChanged);
        assert_eq!(second.new_master, Some(NodeId::from("b")));
    }

    #[test]
    fn test_removal_notification_is_configurable() {
        let bus = Arc::new(MastershipEventBus::new());
        let quiet = RemoteChangeListener::new(Arc::clone(&bus), false);
        let loud = RemoteChangeListener::new(Arc::clone(&bus), true);

        assert!(quiet.translate(&change(Some("a"), None)).is_none());
        let event = loud.translate(&change(Some("a"), None)).unwrap();
        assert_eq!(event.event_type, MastershipEventType::MasterVacated);
    }

    #[test]
    fn test_unchanged_is_silent() {
        let bus = Arc::new(MastershipEventBus::new());
        let listener = RemoteChangeListener::new(bus, true);
        assert!(listener.translate(&change(Some("a"), Some("a"))).is_none());
    }
}
