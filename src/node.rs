//! Namespace nodes and their external-object slot.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::device::WeakDevice;
use crate::vnode::Vnode;
use crate::{Access, DeviceId, MountId, NodeFlags, NodeId, NodeInfo, NodeKind};

/// Cookie of the first real child; `.` is 0 and `..` is 1.
pub(crate) const FIRST_CHILD_COOKIE: u64 = 2;

/// Count of the synthetic `.` and `..` entries of a directory.
pub(crate) const SYNTHETIC_ENTRIES: usize = 2;

/// At most one materialized external object per node.
#[derive(Clone, Default)]
pub(crate) struct VnodeSlot(Option<Arc<dyn Vnode>>);

impl VnodeSlot {
    pub(crate) fn get(&self) -> Option<Arc<dyn Vnode>> {
        self.0.clone()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.0.is_some()
    }

    /// Install `fresh` unless another object is already bound, in which case
    /// `fresh` is handed back as the loser.
    pub(crate) fn try_install(
        &mut self,
        fresh: Arc<dyn Vnode>,
    ) -> Result<Arc<dyn Vnode>, Arc<dyn Vnode>> {
        if self.0.is_some() {
            return Err(fresh);
        }
        self.0 = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    pub(crate) fn take(&mut self) -> Option<Arc<dyn Vnode>> {
        self.0.take()
    }
}

impl fmt::Debug for VnodeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bound() {
            f.write_str("VnodeSlot(bound)")
        } else {
            f.write_str("VnodeSlot(empty)")
        }
    }
}

/// One entry of a mount view's tree.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Next cookie handed to a new child.
    pub(crate) cookie_jar: u64,
    pub(crate) cookie: u64,
    pub(crate) access: Access,
    pub(crate) flags: NodeFlags,
    pub(crate) device: Option<WeakDevice>,
    pub(crate) device_id: Option<DeviceId>,
    pub(crate) link_target: Option<NodeId>,
    /// Stored target text of a user-created symbolic link.
    pub(crate) symlink_text: Option<String>,
    pub(crate) nlinks: usize,
    pub(crate) vnode: VnodeSlot,
    pub(crate) created: SystemTime,
    pub(crate) modified: SystemTime,
    pub(crate) accessed: SystemTime,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind, name: &str, access: Access) -> Self {
        let now = SystemTime::now();
        let flags = if kind == NodeKind::Root {
            NodeFlags::LINKED
        } else {
            NodeFlags::empty()
        };
        Self {
            id,
            kind,
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            cookie_jar: FIRST_CHILD_COOKIE,
            cookie: 0,
            access,
            flags,
            device: None,
            device_id: None,
            link_target: None,
            symlink_text: None,
            nlinks: 0,
            vnode: VnodeSlot::default(),
            created: now,
            modified: now,
            accessed: now,
        }
    }

    #[inline]
    pub(crate) fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Child count including the synthetic entries; 1 for non-directories.
    pub(crate) fn nchildren(&self) -> usize {
        if self.is_dir() {
            self.children.len() + SYNTHETIC_ENTRIES
        } else {
            1
        }
    }

    #[inline]
    pub(crate) fn is_linked(&self) -> bool {
        self.flags.contains(NodeFlags::LINKED)
    }

    #[inline]
    pub(crate) fn is_hidden(&self) -> bool {
        self.flags.contains(NodeFlags::HIDDEN)
    }

    pub(crate) fn info(&self, mount: MountId) -> NodeInfo {
        NodeInfo {
            inode: self.id,
            mount,
            kind: self.kind,
            name: self.name.clone(),
            parent: self.parent,
            access: self.access,
            flags: self.flags,
            cookie: self.cookie,
            children: self.children.len(),
            device: self.device_id,
            link_target: self.link_target,
            nlinks: self.nlinks,
            created: self.created,
            modified: self.modified,
            accessed: self.accessed,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.modified = SystemTime::now();
    }
}
