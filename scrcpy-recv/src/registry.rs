//! Per-session callback registry
//!
//! Four independent device-keyed handler lists, one per [`EventKind`]. The
//! registry itself is not synchronized; the owning session guards it with a
//! single mutex and takes snapshots of handler lists before invoking them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::event::{CtrlSendAck, DeviceDisconnected, DeviceInfo, FrameImage};
use crate::types::{DeviceId, EventKind, RegistrationId};

/// Handler invoked for every frame image of a device.
pub type FrameImageHandler = Arc<dyn Fn(&FrameImage) + Send + Sync>;

/// Handler invoked when a device reports its screen size.
pub type DeviceInfoHandler = Arc<dyn Fn(&DeviceInfo) + Send + Sync>;

/// Handler invoked when a control message send completes.
pub type CtrlSendHandler = Arc<dyn Fn(&CtrlSendAck) + Send + Sync>;

/// Handler invoked when a device channel disconnects.
pub type DisconnectHandler = Arc<dyn Fn(&DeviceDisconnected) + Send + Sync>;

/// Device-keyed, insertion-ordered handler lists for one event kind.
pub(crate) struct HandlerMap<H> {
    by_device: HashMap<DeviceId, Vec<(RegistrationId, H)>>,
}

impl<H: Clone> HandlerMap<H> {
    fn new() -> Self {
        Self {
            by_device: HashMap::new(),
        }
    }

    /// Append a handler to the device's list.
    pub(crate) fn add(&mut self, device: DeviceId, handler: H) -> RegistrationId {
        let id = RegistrationId::next();
        self.by_device.entry(device).or_default().push((id, handler));
        id
    }

    /// Drop every handler of the device, returning how many were removed.
    pub(crate) fn remove_device(&mut self, device: &DeviceId) -> usize {
        self.by_device
            .remove(device)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    /// Drop a single handler.
    ///
    /// Returns the device it belonged to and whether that device has no
    /// handlers left.
    pub(crate) fn remove(&mut self, id: RegistrationId) -> Option<(DeviceId, bool)> {
        let device = self
            .by_device
            .iter()
            .find(|(_, handlers)| handlers.iter().any(|(reg, _)| *reg == id))
            .map(|(device, _)| device.clone())?;

        let now_empty = match self.by_device.get_mut(&device) {
            Some(handlers) => {
                handlers.retain(|(reg, _)| *reg != id);
                handlers.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.by_device.remove(&device);
        }

        Some((device, now_empty))
    }

    /// Snapshot of the device's handlers, in registration order.
    pub(crate) fn handlers(&self, device: &DeviceId) -> Vec<H> {
        self.by_device
            .get(device)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, device: &DeviceId) -> usize {
        self.by_device.get(device).map_or(0, |handlers| handlers.len())
    }

    /// Total handlers across all devices.
    pub(crate) fn len(&self) -> usize {
        self.by_device.values().map(|handlers| handlers.len()).sum()
    }

    pub(crate) fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.by_device.keys()
    }

    fn clear(&mut self) {
        self.by_device.clear();
    }
}

/// All handler registrations of one session.
pub(crate) struct CallbackRegistry {
    pub(crate) frame_image: HandlerMap<FrameImageHandler>,
    pub(crate) device_info: HandlerMap<DeviceInfoHandler>,
    pub(crate) ctrl_send: HandlerMap<CtrlSendHandler>,
    pub(crate) disconnect: HandlerMap<DisconnectHandler>,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        Self {
            frame_image: HandlerMap::new(),
            device_info: HandlerMap::new(),
            ctrl_send: HandlerMap::new(),
            disconnect: HandlerMap::new(),
        }
    }

    /// Aggregate registration count across every kind and every device.
    pub(crate) fn total(&self) -> usize {
        self.frame_image.len() + self.device_info.len() + self.ctrl_send.len() + self.disconnect.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Number of handlers registered for a (device, kind) pair.
    pub(crate) fn count(&self, kind: EventKind, device: &DeviceId) -> usize {
        match kind {
            EventKind::FrameImage => self.frame_image.count(device),
            EventKind::DeviceInfo => self.device_info.count(device),
            EventKind::CtrlSend => self.ctrl_send.count(device),
            EventKind::Disconnect => self.disconnect.count(device),
        }
    }

    /// Remove every handler of `kind` for `device`, returning how many were removed.
    pub(crate) fn remove_device(&mut self, kind: EventKind, device: &DeviceId) -> usize {
        match kind {
            EventKind::FrameImage => self.frame_image.remove_device(device),
            EventKind::DeviceInfo => self.device_info.remove_device(device),
            EventKind::CtrlSend => self.ctrl_send.remove_device(device),
            EventKind::Disconnect => self.disconnect.remove_device(device),
        }
    }

    /// Remove a single registration from whichever list holds it.
    ///
    /// Returns the kind and device it was registered under and whether the
    /// device's list for that kind is now empty.
    pub(crate) fn remove(&mut self, id: RegistrationId) -> Option<(EventKind, DeviceId, bool)> {
        if let Some((device, empty)) = self.frame_image.remove(id) {
            return Some((EventKind::FrameImage, device, empty));
        }
        if let Some((device, empty)) = self.device_info.remove(id) {
            return Some((EventKind::DeviceInfo, device, empty));
        }
        if let Some((device, empty)) = self.ctrl_send.remove(id) {
            return Some((EventKind::CtrlSend, device, empty));
        }
        self.disconnect
            .remove(id)
            .map(|(device, empty)| (EventKind::Disconnect, device, empty))
    }

    pub(crate) fn clear(&mut self) {
        self.frame_image.clear();
        self.device_info.clear();
        self.ctrl_send.clear();
        self.disconnect.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_info() -> DeviceInfoHandler {
        Arc::new(|_: &DeviceInfo| {})
    }

    #[test]
    fn test_handler_map_add_and_snapshot() {
        let mut map: HandlerMap<DeviceInfoHandler> = HandlerMap::new();
        let d1 = DeviceId::new("d1");

        let first = map.add(d1.clone(), noop_info());
        let second = map.add(d1.clone(), noop_info());
        assert_ne!(first, second);
        assert_eq!(map.count(&d1), 2);
        assert_eq!(map.handlers(&d1).len(), 2);
        assert_eq!(map.len(), 2);
        assert!(map.handlers(&DeviceId::new("d2")).is_empty());
    }

    #[test]
    fn test_handler_map_remove_single() {
        let mut map: HandlerMap<DeviceInfoHandler> = HandlerMap::new();
        let d1 = DeviceId::new("d1");

        let first = map.add(d1.clone(), noop_info());
        let second = map.add(d1.clone(), noop_info());

        assert_eq!(map.remove(first), Some((d1.clone(), false)));
        assert_eq!(map.remove(first), None);
        assert_eq!(map.remove(second), Some((d1.clone(), true)));
        assert_eq!(map.devices().count(), 0);
    }

    #[test]
    fn test_remove_device_without_registrations() {
        let mut registry = CallbackRegistry::new();
        assert_eq!(
            registry.remove_device(EventKind::FrameImage, &DeviceId::new("ghost")),
            0
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_aggregate_count_spans_kinds_and_devices() {
        let mut registry = CallbackRegistry::new();
        let d1 = DeviceId::new("d1");
        let d2 = DeviceId::new("d2");

        registry.device_info.add(d1.clone(), noop_info());
        registry
            .ctrl_send
            .add(d2.clone(), Arc::new(|_: &CtrlSendAck| {}));
        registry
            .disconnect
            .add(d2.clone(), Arc::new(|_: &DeviceDisconnected| {}));
        assert_eq!(registry.total(), 3);

        assert_eq!(registry.remove_device(EventKind::DeviceInfo, &d1), 1);
        assert!(!registry.is_empty());
        assert_eq!(registry.count(EventKind::CtrlSend, &d2), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_remove_reports_kind() {
        let mut registry = CallbackRegistry::new();
        let d1 = DeviceId::new("d1");
        let id = registry
            .frame_image
            .add(d1.clone(), Arc::new(|_: &FrameImage| {}));

        assert_eq!(registry.remove(id), Some((EventKind::FrameImage, d1, true)));
        assert_eq!(registry.remove(id), None);
    }
}
