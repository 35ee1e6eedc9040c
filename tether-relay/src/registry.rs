//! Registered devices and the viewers bound to them.
//!
//! This is plain data: no I/O and no locking. [`crate::Relay`] owns the
//! registry behind a mutex and is the only thing that mutates it at runtime.

use std::collections::HashMap;
use std::net::SocketAddr;

use log::debug;
use serde::Serialize;
use tether_proto::Eid;

use crate::buffer::{BufferedMessage, MessageBuffer};
use crate::error::RegistryError;

/// Whether a device still holds its pre-pairing buffer.
#[derive(Debug)]
pub enum DeviceState {
    Buffering(MessageBuffer),
    /// The buffer was replayed to the first viewer. It never comes back.
    Live,
}

/// The viewer currently holding a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerLock {
    pub viewer: Eid,
    /// Network origin of the viewer, when the transport knows it.
    pub origin: Option<SocketAddr>,
}

#[derive(Debug)]
pub struct DeviceSession {
    eid: Eid,
    peer_address: Option<SocketAddr>,
    info: Option<String>,
    state: DeviceState,
    locked_by: Option<ViewerLock>,
}

impl DeviceSession {
    fn new(eid: Eid, peer_address: Option<SocketAddr>, info: Option<String>) -> Self {
        Self {
            eid,
            peer_address,
            info,
            state: DeviceState::Buffering(MessageBuffer::new()),
            locked_by: None,
        }
    }

    pub fn peer_address(&self) -> Option<SocketAddr> {
        self.peer_address
    }

    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    pub(crate) fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }

    pub fn locked_by(&self) -> Option<ViewerLock> {
        self.locked_by
    }

    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }

    pub fn viewer(&self) -> Option<Eid> {
        self.locked_by.map(|lock| lock.viewer)
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, DeviceState::Live)
    }

    /// Number of messages waiting for the first viewer.
    pub fn buffered(&self) -> usize {
        match &self.state {
            DeviceState::Buffering(buffer) => buffer.len(),
            DeviceState::Live => 0,
        }
    }

    /// Payload bytes waiting for the first viewer.
    pub fn buffered_bytes(&self) -> usize {
        match &self.state {
            DeviceState::Buffering(buffer) => buffer.bytes(),
            DeviceState::Live => 0,
        }
    }

    /// Switch to `Live` and hand back whatever was buffered.
    ///
    /// Returns `None` if the buffer was already taken.
    pub(crate) fn take_buffer(&mut self) -> Option<Vec<BufferedMessage>> {
        match std::mem::replace(&mut self.state, DeviceState::Live) {
            DeviceState::Buffering(buffer) => Some(buffer.into_messages()),
            DeviceState::Live => None,
        }
    }
}

/// A row of the `/devices` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub eid: Eid,
    pub peer_address: Option<String>,
    pub info: Option<String>,
    pub locked: bool,
    pub buffered: usize,
    pub buffered_bytes: usize,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    devices: HashMap<Eid, DeviceSession>,
    /// viewer -> device
    viewers: HashMap<Eid, Eid>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device with an empty buffer.
    ///
    /// Never overwrites: an `eid` that is already a device or a bound viewer
    /// means the transport handed out the same id twice.
    pub fn register_device(
        &mut self,
        eid: Eid,
        peer_address: Option<SocketAddr>,
        info: Option<String>,
    ) -> Result<&mut DeviceSession, RegistryError> {
        if self.devices.contains_key(&eid) || self.viewers.contains_key(&eid) {
            return Err(RegistryError::AlreadyRegistered(eid));
        }
        debug!("registering device {eid} from {peer_address:?}");
        Ok(self
            .devices
            .entry(eid)
            .or_insert_with(|| DeviceSession::new(eid, peer_address, info)))
    }

    pub fn lookup_device(&self, eid: Eid) -> Option<&DeviceSession> {
        self.devices.get(&eid)
    }

    pub(crate) fn lookup_device_mut(&mut self, eid: Eid) -> Option<&mut DeviceSession> {
        self.devices.get_mut(&eid)
    }

    /// Lock `device` for `viewer`.
    pub fn bind_viewer(
        &mut self,
        viewer: Eid,
        origin: Option<SocketAddr>,
        device: Eid,
    ) -> Result<&mut DeviceSession, RegistryError> {
        if let Some(bound) = self.viewers.get(&viewer) {
            return Err(RegistryError::ViewerAlreadyBound(viewer, *bound));
        }
        if self.devices.contains_key(&viewer) {
            return Err(RegistryError::AlreadyRegistered(viewer));
        }
        let session = self
            .devices
            .get_mut(&device)
            .ok_or(RegistryError::UnknownDevice(device))?;
        if let Some(lock) = session.locked_by {
            return Err(RegistryError::AlreadyLocked(device, lock.viewer));
        }
        session.locked_by = Some(ViewerLock { viewer, origin });
        self.viewers.insert(viewer, device);
        debug!("bound viewer {viewer} to device {device}");
        Ok(session)
    }

    /// Remove a device, together with the binding of its viewer if it has one.
    pub fn unregister_device(&mut self, eid: Eid) -> Option<DeviceSession> {
        let session = self.devices.remove(&eid)?;
        if let Some(viewer) = session.viewer() {
            self.viewers.remove(&viewer);
        }
        debug!("unregistered device {eid}");
        Some(session)
    }

    /// Remove a viewer's binding and release the lock it held.
    ///
    /// Returns the device it was bound to. The device stays registered and
    /// `Live`, so nothing it sends is buffered again; callers tearing down a
    /// pairing must follow up with [`Self::unregister_device`].
    pub fn unbind_viewer(&mut self, viewer: Eid) -> Option<Eid> {
        let device = self.viewers.remove(&viewer)?;
        if let Some(session) = self.devices.get_mut(&device) {
            if session.viewer() == Some(viewer) {
                session.locked_by = None;
            }
        }
        debug!("unbound viewer {viewer} from device {device}");
        Some(device)
    }

    pub fn device_of(&self, viewer: Eid) -> Option<Eid> {
        self.viewers.get(&viewer).copied()
    }

    pub fn viewer_of(&self, device: Eid) -> Option<Eid> {
        self.devices.get(&device).and_then(|d| d.viewer())
    }

    /// True when `a` and `b` are the two ends of one binding, in either order.
    pub fn is_paired(&self, a: Eid, b: Eid) -> bool {
        self.device_of(a) == Some(b) || self.device_of(b) == Some(a)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn binding_count(&self) -> usize {
        self.viewers.len()
    }

    /// All registered devices, ordered by id.
    pub fn snapshot(&self) -> Vec<DeviceSummary> {
        let mut out: Vec<DeviceSummary> = self
            .devices
            .values()
            .map(|d| DeviceSummary {
                eid: d.eid,
                peer_address: d.peer_address.map(|a| a.to_string()),
                info: d.info.clone(),
                locked: d.is_locked(),
                buffered: d.buffered(),
                buffered_bytes: d.buffered_bytes(),
            })
            .collect();
        out.sort_by_key(|d| d.eid);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k9::assert_equal;
    use tether_proto::SubChannel;

    fn addr(port: u16) -> Option<SocketAddr> {
        Some(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), addr(5000), Some("cam".to_string()))
            .unwrap();

        let dev = reg.lookup_device(Eid(1)).unwrap();
        assert_equal!(dev.peer_address(), addr(5000));
        assert_equal!(dev.info(), Some("cam"));
        assert!(!dev.is_locked());
        assert!(!dev.is_live());
        assert!(reg.lookup_device(Eid(2)).is_none());
    }

    #[test]
    fn double_registration_is_rejected_without_overwriting() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), addr(5000), Some("first".to_string()))
            .unwrap();
        let err = reg
            .register_device(Eid(1), addr(6000), Some("second".to_string()))
            .unwrap_err();
        assert_equal!(err, RegistryError::AlreadyRegistered(Eid(1)));
        assert_equal!(reg.lookup_device(Eid(1)).unwrap().info(), Some("first"));
    }

    #[test]
    fn bind_sets_lock_and_mapping_together() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), None, None).unwrap();
        reg.bind_viewer(Eid(2), addr(7000), Eid(1)).unwrap();

        let dev = reg.lookup_device(Eid(1)).unwrap();
        assert_equal!(
            dev.locked_by(),
            Some(ViewerLock {
                viewer: Eid(2),
                origin: addr(7000)
            })
        );
        assert_equal!(reg.device_of(Eid(2)), Some(Eid(1)));
        assert_equal!(reg.viewer_of(Eid(1)), Some(Eid(2)));
        assert!(reg.is_paired(Eid(1), Eid(2)));
        assert!(reg.is_paired(Eid(2), Eid(1)));
    }

    #[test]
    fn second_bind_fails_with_already_locked() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), None, None).unwrap();
        reg.bind_viewer(Eid(2), None, Eid(1)).unwrap();

        let err = reg.bind_viewer(Eid(3), None, Eid(1)).unwrap_err();
        assert_equal!(err, RegistryError::AlreadyLocked(Eid(1), Eid(2)));
        assert_equal!(reg.viewer_of(Eid(1)), Some(Eid(2)));
        assert_equal!(reg.device_of(Eid(3)), None);
    }

    #[test]
    fn viewer_binds_to_at_most_one_device() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), None, None).unwrap();
        reg.register_device(Eid(3), None, None).unwrap();
        reg.bind_viewer(Eid(2), None, Eid(1)).unwrap();

        let err = reg.bind_viewer(Eid(2), None, Eid(3)).unwrap_err();
        assert_equal!(err, RegistryError::ViewerAlreadyBound(Eid(2), Eid(1)));
        assert!(!reg.lookup_device(Eid(3)).unwrap().is_locked());
    }

    #[test]
    fn bind_to_unknown_device_fails() {
        let mut reg = SessionRegistry::new();
        let err = reg.bind_viewer(Eid(2), None, Eid(999)).unwrap_err();
        assert_equal!(err, RegistryError::UnknownDevice(Eid(999)));
        assert_equal!(reg.binding_count(), 0);
    }

    #[test]
    fn unregister_device_drops_its_binding() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), None, None).unwrap();
        reg.bind_viewer(Eid(2), None, Eid(1)).unwrap();

        let removed = reg.unregister_device(Eid(1)).unwrap();
        assert_equal!(removed.viewer(), Some(Eid(2)));
        assert_equal!(reg.device_of(Eid(2)), None);
        assert_equal!(reg.device_count(), 0);
        assert_equal!(reg.binding_count(), 0);
    }

    #[test]
    fn unbind_viewer_releases_the_lock() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), None, None).unwrap();
        reg.bind_viewer(Eid(2), None, Eid(1)).unwrap();

        assert_equal!(reg.unbind_viewer(Eid(2)), Some(Eid(1)));
        assert!(!reg.lookup_device(Eid(1)).unwrap().is_locked());
    }

    #[test]
    fn unregister_and_unbind_are_idempotent() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), None, None).unwrap();
        reg.bind_viewer(Eid(2), None, Eid(1)).unwrap();

        assert!(reg.unbind_viewer(Eid(2)).is_some());
        assert!(reg.unbind_viewer(Eid(2)).is_none());
        assert!(reg.unregister_device(Eid(1)).is_some());
        assert!(reg.unregister_device(Eid(1)).is_none());
        assert!(reg.unbind_viewer(Eid(42)).is_none());
        assert_equal!(reg.device_count(), 0);
        assert_equal!(reg.binding_count(), 0);
    }

    #[test]
    fn buffer_is_taken_exactly_once() {
        let mut reg = SessionRegistry::new();
        let dev = reg.register_device(Eid(1), None, None).unwrap();
        if let DeviceState::Buffering(buffer) = dev.state_mut() {
            buffer.push(SubChannel(1), b"a".to_vec());
        }

        let first = dev.take_buffer().unwrap();
        assert_equal!(first.len(), 1);
        assert!(dev.is_live());
        assert_equal!(dev.buffered(), 0);
        assert!(dev.take_buffer().is_none());
    }

    #[test]
    fn viewer_id_cannot_register_as_device() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(1), None, None).unwrap();
        reg.bind_viewer(Eid(2), None, Eid(1)).unwrap();
        assert_equal!(
            reg.register_device(Eid(2), None, None).unwrap_err(),
            RegistryError::AlreadyRegistered(Eid(2))
        );
    }

    #[test]
    fn snapshot_is_sorted_and_reports_state() {
        let mut reg = SessionRegistry::new();
        reg.register_device(Eid(5), addr(1), Some("b".to_string()))
            .unwrap();
        let waiting = reg
            .register_device(Eid(3), None, Some("a".to_string()))
            .unwrap();
        if let DeviceState::Buffering(buffer) = waiting.state_mut() {
            buffer.push(SubChannel(1), b"abc".to_vec());
        }
        reg.bind_viewer(Eid(9), None, Eid(5)).unwrap();

        let snap = reg.snapshot();
        assert_equal!(
            snap,
            vec![
                DeviceSummary {
                    eid: Eid(3),
                    peer_address: None,
                    info: Some("a".to_string()),
                    locked: false,
                    buffered: 1,
                    buffered_bytes: 3,
                },
                DeviceSummary {
                    eid: Eid(5),
                    peer_address: Some("127.0.0.1:1".to_string()),
                    info: Some("b".to_string()),
                    locked: true,
                    buffered: 0,
                    buffered_bytes: 0,
                },
            ]
        );
    }
}
