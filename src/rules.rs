//! Rule engine seam.
//!
//! Every node allocated in any view is offered to the injected
//! [`RuleEngine`] once the mutation that created it is complete. The engine
//! sees a [`RuleTarget`] snapshot, edits it, and the edits are committed if
//! the node still exists. The engine runs on the core actor with the state
//! released, so it may call back into the service.

use crate::{Access, NodeFlags, NodeInfo};

/// Injected policy that tags new nodes.
///
/// # Example
///
/// ```rust
/// use devfs_core::{Access, RuleEngine, RuleTarget};
///
/// /// Make every tty group-readable and hide console devices.
/// struct TtyRules;
///
/// impl RuleEngine for TtyRules {
///     fn apply(&self, target: &mut RuleTarget) {
///         let name = target.info().name.clone();
///         if name.starts_with("tty") {
///             target.set_access(Access::new(0, 4, 0o660));
///         }
///         if name == "console" {
///             target.set_hidden(true);
///         }
///     }
/// }
/// ```
pub trait RuleEngine: Send + Sync {
    /// Apply rules to a node.
    fn apply(&self, target: &mut RuleTarget);

    /// Undo rule effects on a node. Links created by rules are removed by the
    /// service regardless of what this does.
    fn reset(&self, target: &mut RuleTarget) {
        target.restore_defaults();
    }
}

/// Engine that leaves every node untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRules;

impl RuleEngine for NoRules {
    fn apply(&self, _target: &mut RuleTarget) {}
}

/// Editable snapshot of one node offered to a [`RuleEngine`].
#[derive(Debug, Clone)]
pub struct RuleTarget {
    info: NodeInfo,
    mount_point: String,
    device_name: Option<String>,
    default_access: Access,
    access: Access,
    hidden: bool,
    invisible: bool,
    links: Vec<String>,
}

impl RuleTarget {
    pub(crate) fn new(
        info: NodeInfo,
        mount_point: &str,
        device_name: Option<String>,
        default_access: Access,
    ) -> Self {
        Self {
            access: info.access,
            hidden: info.flags.contains(NodeFlags::HIDDEN),
            invisible: info.flags.contains(NodeFlags::INVISIBLE),
            info,
            mount_point: mount_point.to_string(),
            device_name,
            default_access,
            links: Vec::new(),
        }
    }

    /// Node as it was when offered.
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// Mount point of the node's view.
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Full name of the backing device, for device leaves.
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Access triple to commit.
    pub fn access(&self) -> Access {
        self.access
    }

    /// Replace the access triple.
    pub fn set_access(&mut self, access: Access) {
        self.access = access;
    }

    /// Whether the node will be hidden.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Hide the node from lookups and listings.
    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// Whether the node will be skipped by listings.
    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    /// Skip the node in listings while keeping it resolvable.
    pub fn set_invisible(&mut self, invisible: bool) {
        self.invisible = invisible;
    }

    /// Request a symbolic link at `path` (relative to the view root)
    /// pointing at this node.
    pub fn add_link(&mut self, path: impl Into<String>) {
        self.links.push(path.into());
    }

    /// Link paths requested so far.
    pub fn links(&self) -> &[String] {
        &self.links
    }

    /// Access the node had before any rule, and no visibility flags.
    pub fn restore_defaults(&mut self) {
        self.access = self.default_access;
        self.hidden = false;
        self.invisible = false;
    }

    pub(crate) fn flags(&self) -> (NodeFlags, NodeFlags) {
        let mut set = NodeFlags::empty();
        let mut clear = NodeFlags::empty();
        let wanted = [
            (self.hidden, NodeFlags::HIDDEN),
            (self.invisible, NodeFlags::INVISIBLE),
        ];
        for (on, flag) in wanted {
            if on {
                set |= flag;
            } else {
                clear |= flag;
            }
        }
        (set, clear)
    }

    pub(crate) fn into_links(self) -> Vec<String> {
        self.links
    }
}

/// Which rule entry point a queued node is offered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RulePass {
    Apply,
    Reset,
}
