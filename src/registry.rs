//! Device Registry: the ordered set of linked device handles.

use log::warn;

use crate::{DevfsError, DeviceHandle, DeviceId};

/// Linked handles in registration order.
///
/// Membership is mirrored by each handle's linked flag, so the duplicate
/// check is O(1); lookups are linear scans.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    devices: Vec<DeviceHandle>,
}

impl Registry {
    /// Link `dev`, taking the registry's reference.
    pub(crate) fn link(&mut self, dev: DeviceHandle) -> Result<(), DevfsError> {
        if !dev.mark_linked() {
            warn!("register: {} is already registered, ignoring", dev.name());
            return Err(DevfsError::exists(dev.name(), "register"));
        }
        self.devices.push(dev);
        Ok(())
    }

    /// Unlink `dev`, handing the registry's reference back to the caller.
    pub(crate) fn unlink(&mut self, dev: &DeviceHandle) -> Result<DeviceHandle, DevfsError> {
        if !dev.mark_unlinked() {
            return Err(DevfsError::AlreadyRemoved {
                name: dev.name().to_string(),
            });
        }
        let pos = self
            .devices
            .iter()
            .position(|d| d.ptr_eq(dev))
            .ok_or_else(|| DevfsError::AlreadyRemoved {
                name: dev.name().to_string(),
            })?;
        Ok(self.devices.remove(pos))
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<&DeviceHandle> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub(crate) fn find_by_identity(&self, id: DeviceId) -> Option<&DeviceHandle> {
        self.devices.iter().find(|d| d.id() == id)
    }

    /// First linked handle derived from `parent`.
    pub(crate) fn first_child_of(&self, parent: &DeviceHandle) -> Option<DeviceHandle> {
        self.devices.iter().find(|d| d.is_child_of(parent)).cloned()
    }

    pub(crate) fn children_of(&self, parent: &DeviceHandle) -> Vec<DeviceHandle> {
        self.devices
            .iter()
            .filter(|d| d.is_child_of(parent))
            .cloned()
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.devices.len()
    }
}
