//! Garbage Collector.
//!
//! Removing a leaf can leave behind symbolic links pointing at it and
//! auto-created directories that only existed to hold it. Both are cleaned
//! up here, one mount view at a time. The whole-tree walks are only paid on
//! removal, never on lookup.

use log::debug;

use crate::node::Node;
use crate::path::{components, split_name};
use crate::tree::Tree;
use crate::{DeviceHandle, NodeFlags, NodeId, NodeKind};

impl Tree {
    /// Remove `id` together with the links to it and every directory left
    /// empty that no user created.
    pub(crate) fn collect(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        if node.nlinks > 0 {
            self.purge_links_to(id);
        }
        self.unlink(id);
        self.prune_empty_dirs();
        self.free(id);
    }

    /// Unlink and free every symbolic link whose target is `target`.
    pub(crate) fn purge_links_to(&mut self, target: NodeId) {
        for id in self.post_order(self.root()) {
            let is_link = self.get(id).is_some_and(|n| {
                n.kind == NodeKind::SymbolicLink && n.link_target == Some(target)
            });
            if is_link {
                self.unlink(id);
                self.free(id);
            }
        }
    }

    /// Remove auto-created directories holding nothing but the synthetic
    /// entries. Post-order makes removals cascade up the tree.
    pub(crate) fn prune_empty_dirs(&mut self) {
        for id in self.post_order(self.root()) {
            let empty = self.get(id).is_some_and(|n| {
                n.kind == NodeKind::Directory
                    && n.nchildren() == crate::node::SYNTHETIC_ENTRIES
                    && !n.flags.contains(NodeFlags::USER_CREATED)
            });
            if empty {
                self.unlink(id);
                self.free(id);
            }
        }
    }

    /// Resolve `name` as a path, without creating anything, and collect the
    /// node found there if `accept` agrees. Returns whether a node was
    /// collected.
    pub(crate) fn destroy_node(&mut self, name: &str, accept: impl Fn(&Node) -> bool) -> bool {
        let (dir, leaf) = split_name(name);
        let mut parent = self.root();
        for seg in components(dir.unwrap_or("")) {
            match self.find_child(parent, seg) {
                Some(id) => parent = id,
                None => return false,
            }
        }
        let Some(id) = self.find_child(parent, leaf) else {
            return false;
        };
        if !self.get(id).is_some_and(&accept) {
            return false;
        }
        if let Some(p) = self.get_mut(parent) {
            p.touch();
        }
        debug!("{}: collecting {}", self.mount(), name);
        self.collect(id);
        true
    }

    /// Collect the leaf standing for `dev` in this view.
    pub(crate) fn destroy_device_node(&mut self, dev: &DeviceHandle) -> bool {
        self.destroy_node(dev.name(), |n| {
            n.kind == NodeKind::DeviceLeaf && n.device.as_ref().is_some_and(|d| d.is(dev))
        })
    }

    /// Collect the alias mirror called `name`. Only a link the service made
    /// to the leaf of `target` qualifies; user links are left alone.
    pub(crate) fn destroy_link(&mut self, name: &str, target: &DeviceHandle) -> bool {
        let Some(leaf) = self.find_device_leaf(target) else {
            return false;
        };
        self.destroy_node(name, |n| {
            n.kind == NodeKind::SymbolicLink
                && n.link_target == Some(leaf)
                && !n.flags.contains(NodeFlags::USER_CREATED)
        })
    }
}
