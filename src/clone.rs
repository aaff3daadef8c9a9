//! Clone-handler seam.
//!
//! A clone handler manufactures a device on demand when a name it owns is
//! opened, e.g. a fresh pseudo-terminal each time `ptmx` is opened.

use std::fmt;
use std::sync::Arc;

use log::warn;

use crate::{DevfsError, DeviceHandle};

/// Creates devices on demand for one exact name.
///
/// Handlers run on the core actor with the namespace state released, so a
/// handler may register the device it creates through the service before
/// returning it.
pub trait CloneHandler: Send + Sync {
    /// Produce a device for `name`, or `None` to decline.
    fn clone_device(&self, name: &str) -> Option<DeviceHandle>;
}

impl<F> CloneHandler for F
where
    F: Fn(&str) -> Option<DeviceHandle> + Send + Sync,
{
    fn clone_device(&self, name: &str) -> Option<DeviceHandle> {
        self(name)
    }
}

#[derive(Clone)]
struct Entry {
    name: String,
    handler: Arc<dyn CloneHandler>,
}

/// Registered handlers, unique by name.
#[derive(Clone, Default)]
pub(crate) struct CloneHandlers {
    entries: Vec<Entry>,
}

impl CloneHandlers {
    pub(crate) fn add(
        &mut self,
        name: &str,
        handler: Arc<dyn CloneHandler>,
    ) -> Result<(), DevfsError> {
        if name.is_empty() {
            return Err(DevfsError::InvalidName { name: name.into() });
        }
        if self.entries.iter().any(|e| e.name == name) {
            warn!("clone handler {name} already registered");
            return Err(DevfsError::exists(name, "add_clone_handler"));
        }
        self.entries.push(Entry {
            name: name.to_string(),
            handler,
        });
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> Result<(), DevfsError> {
        if name.is_empty() {
            return Err(DevfsError::InvalidName { name: name.into() });
        }
        let pos = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| DevfsError::not_found(name))?;
        self.entries.remove(pos);
        Ok(())
    }

    pub(crate) fn find(&self, name: &str) -> Option<Arc<dyn CloneHandler>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.handler))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for CloneHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|e| &e.name)).finish()
    }
}
