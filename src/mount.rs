//! Mount views.

use std::fmt;
use std::sync::Arc;

use crate::tree::Tree;
use crate::vnode::VnodeAllocator;
use crate::{DevfsError, MountId, NodeId, NodeInfo};

/// Description of a mount handed to [`Devfs::add_mount`](crate::Devfs::add_mount).
#[derive(Clone)]
pub struct MountSpec {
    /// Identity of the view.
    pub id: MountId,
    /// Mount point name, used by [`MountSelector::Named`].
    pub mount_point: String,
    /// Allocator for the view's external objects.
    pub allocator: Arc<dyn VnodeAllocator>,
}

impl MountSpec {
    /// Build a mount description.
    pub fn new(
        id: MountId,
        mount_point: impl Into<String>,
        allocator: Arc<dyn VnodeAllocator>,
    ) -> Self {
        Self {
            id,
            mount_point: mount_point.into(),
            allocator,
        }
    }
}

impl fmt::Debug for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountSpec")
            .field("id", &self.id)
            .field("mount_point", &self.mount_point)
            .finish_non_exhaustive()
    }
}

/// Which views a rule pass applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MountSelector {
    /// Every view (the `*` selector).
    All,
    /// The view mounted at exactly this point.
    Named(String),
}

impl MountSelector {
    /// Parse the textual form: `*` selects every view.
    pub fn parse(s: &str) -> Self {
        if s == "*" {
            Self::All
        } else {
            Self::Named(s.to_string())
        }
    }

    /// Whether a view mounted at `mount_point` is selected.
    pub fn matches(&self, mount_point: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(name) => name == mount_point,
        }
    }
}

/// Diagnostic counters of one view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MountStats {
    /// Nodes allocated and not yet freed, root included.
    pub nodes: usize,
    /// Nodes currently on the orphan list.
    pub orphans: usize,
    /// Nodes reaped as leaks over the view's lifetime.
    pub leaked_total: usize,
}

/// One active mount: its tree plus bookkeeping.
#[derive(Debug)]
pub(crate) struct MountView {
    pub(crate) spec: MountSpec,
    pub(crate) tree: Tree,
    pub(crate) leaked_total: usize,
}

impl MountView {
    pub(crate) fn new(spec: MountSpec, tree: Tree) -> Self {
        Self {
            spec,
            tree,
            leaked_total: 0,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> MountId {
        self.spec.id
    }

    /// Snapshot of one node of this view.
    pub(crate) fn info(&self, inode: NodeId) -> Result<NodeInfo, DevfsError> {
        self.tree
            .get(inode)
            .map(|n| n.info(self.id()))
            .ok_or(DevfsError::InodeNotFound { inode })
    }

    pub(crate) fn stats(&self) -> MountStats {
        MountStats {
            nodes: self.tree.live(),
            orphans: self.tree.orphan_count(),
            leaked_total: self.leaked_total,
        }
    }
}
