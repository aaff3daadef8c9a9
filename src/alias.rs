//! Alias Registry: named cross-references to device handles.

use log::{debug, warn};

use crate::device::WeakDevice;
use crate::matcher::wild_match;
use crate::{DevfsError, DeviceHandle};

/// One recorded alias. The target reference is non-owning.
#[derive(Debug, Clone)]
pub(crate) struct Alias {
    pub(crate) name: String,
    pub(crate) target: WeakDevice,
}

impl Alias {
    pub(crate) fn targets(&self, dev: &DeviceHandle) -> bool {
        self.target.is(dev)
    }
}

#[derive(Debug, Default)]
pub(crate) struct AliasRegistry {
    aliases: Vec<Alias>,
}

impl AliasRegistry {
    /// Record a new alias; identical names are rejected. Aliases whose
    /// target has been dropped no longer hold their name.
    pub(crate) fn insert(
        &mut self,
        name: &str,
        target: &DeviceHandle,
    ) -> Result<Alias, DevfsError> {
        self.prune();
        if self.aliases.iter().any(|a| a.name == name) {
            warn!("make_alias: alias {name} already exists, ignoring");
            return Err(DevfsError::exists(name, "make_alias"));
        }
        let alias = Alias {
            name: name.to_string(),
            target: target.downgrade(),
        };
        self.aliases.push(alias.clone());
        Ok(alias)
    }

    /// Forget aliases whose target no longer exists.
    fn prune(&mut self) {
        let before = self.aliases.len();
        self.aliases.retain(|a| !a.target.is_dropped());
        let dropped = before - self.aliases.len();
        if dropped > 0 {
            debug!("pruned {dropped} aliases to dropped devices");
        }
    }

    /// Remove the first alias on `target`, in registration order, whose name
    /// matches `pattern`.
    pub(crate) fn take_first_match(
        &mut self,
        pattern: &str,
        target: &DeviceHandle,
    ) -> Option<Alias> {
        let pos = self
            .aliases
            .iter()
            .position(|a| a.targets(target) && wild_match(pattern, &a.name))?;
        Some(self.aliases.remove(pos))
    }

    /// Remove every alias targeting `target`.
    pub(crate) fn remove_all_for(&mut self, target: &DeviceHandle) -> Vec<Alias> {
        let (gone, kept) = std::mem::take(&mut self.aliases)
            .into_iter()
            .partition(|a| a.targets(target));
        self.aliases = kept;
        gone
    }

    pub(crate) fn for_target<'a>(
        &'a self,
        target: &'a DeviceHandle,
    ) -> impl Iterator<Item = &'a Alias> {
        self.aliases.iter().filter(move |a| a.targets(target))
    }

    /// Target of the alias called exactly `name`.
    pub(crate) fn resolve(&self, name: &str) -> Option<DeviceHandle> {
        self.aliases
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.target.upgrade())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Alias> {
        self.aliases.iter()
    }
}
