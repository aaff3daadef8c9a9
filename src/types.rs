//! Core types for the device namespace.

use std::fmt;
use std::time::SystemTime;

use bitflags::bitflags;

/// Globally unique namespace node identity (the inode number).
///
/// Handed out by one counter shared by every mount view, so identities never
/// collide across views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one mount, chosen by the caller that adds the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MountId(pub u64);

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mount#{}", self.0)
    }
}

/// Opaque identity of a driver implementation (the code behind a device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImplId(pub u64);

/// Raw device identity: implementation unit in the high half, minor in the low half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(pub u64);

impl DeviceId {
    /// Compose an identity from an implementation unit and a minor number.
    #[inline]
    pub const fn new(unit: u32, minor: u32) -> Self {
        Self(((unit as u64) << 32) | minor as u64)
    }

    /// The implementation unit (major) half.
    #[inline]
    pub const fn unit(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The minor half.
    #[inline]
    pub const fn minor(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit(), self.minor())
    }
}

/// Kind of a namespace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Root of one mount view.
    Root,
    /// Directory (auto-created or user-created).
    Directory,
    /// Leaf standing for one registered device handle.
    DeviceLeaf,
    /// Symbolic link, either an alias mirror or a user link.
    SymbolicLink,
    /// Regular file.
    RegularFile,
}

impl NodeKind {
    /// Returns `true` for kinds that hold children.
    #[inline]
    pub fn is_dir(self) -> bool {
        matches!(self, NodeKind::Root | NodeKind::Directory)
    }
}

/// Unix-style access-control triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Access {
    /// Owning user.
    pub uid: u32,
    /// Owning group.
    pub gid: u32,
    /// Permission bits.
    pub mode: u32,
}

impl Access {
    /// Build a triple; the mode is masked to the permission bits.
    #[inline]
    pub const fn new(uid: u32, gid: u32, mode: u32) -> Self {
        Self {
            uid,
            gid,
            mode: mode & 0o7777,
        }
    }

    /// Same owner, different mode.
    #[inline]
    pub const fn with_mode(self, mode: u32) -> Self {
        Self::new(self.uid, self.gid, mode)
    }
}

impl Default for Access {
    fn default() -> Self {
        Self::new(0, 0, 0o600)
    }
}

bitflags! {
    /// State flags of a namespace node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct NodeFlags: u32 {
        /// Linked into a parent (always set on a live root).
        const LINKED = 1 << 0;
        /// Sitting on the orphan list.
        const ORPHANED = 1 << 1;
        /// Freed; set exactly once.
        const DESTROYED = 1 << 2;
        /// Inaccessible: lookups fail and listings skip it.
        const HIDDEN = 1 << 3;
        /// Skipped by listings but still resolvable.
        const INVISIBLE = 1 << 4;
        /// Created by a user operation; never garbage-collected.
        const USER_CREATED = 1 << 5;
        /// Created by the rule engine.
        const RULE_CREATED = 1 << 6;
    }
}

bitflags! {
    /// Driver-owned flags on a device handle.
    ///
    /// The namespace only interprets them in the descendant flag operations,
    /// so any bit pattern is allowed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DeviceFlags: u32 {
        /// Storage behind the device may be released on last close.
        const CAN_FREE = 1 << 0;
        /// Device was probed and is still present.
        const PRESENT = 1 << 1;
        const _ = !0;
    }
}

/// Minor-number filter for [`Devfs::destroy_matching`](crate::Devfs::destroy_matching).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinorSelector {
    /// Every minor number.
    Any,
    /// Exactly this minor number.
    Exact(u32),
}

impl MinorSelector {
    /// Whether `minor` passes the filter.
    #[inline]
    pub fn matches(self, minor: u32) -> bool {
        match self {
            MinorSelector::Any => true,
            MinorSelector::Exact(m) => m == minor,
        }
    }
}

/// Point-in-time snapshot of one namespace node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeInfo {
    /// Node identity.
    pub inode: NodeId,
    /// Mount view the node belongs to.
    pub mount: MountId,
    /// Kind of node.
    pub kind: NodeKind,
    /// Entry name (empty for a root).
    pub name: String,
    /// Parent identity, `None` for a root or an orphan.
    pub parent: Option<NodeId>,
    /// Access-control triple.
    pub access: Access,
    /// State flags.
    pub flags: NodeFlags,
    /// Enumeration cookie inside the parent.
    pub cookie: u64,
    /// Real children (synthetic entries excluded).
    pub children: usize,
    /// Identity of the backing device for a device leaf.
    pub device: Option<DeviceId>,
    /// Node a symbolic link points at.
    pub link_target: Option<NodeId>,
    /// Number of alias links pointing at this node.
    pub nlinks: usize,
    /// Creation time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub created: SystemTime,
    /// Last modification time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub modified: SystemTime,
    /// Last access time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub accessed: SystemTime,
}

impl NodeInfo {
    /// Returns `true` for a root or directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Returns `true` for a symbolic link.
    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.kind == NodeKind::SymbolicLink
    }
}

/// A directory entry returned from [`Devfs::read_dir`](crate::Devfs::read_dir).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// Entry name (`.` and `..` for the synthetic entries).
    pub name: String,
    /// Node identity.
    pub inode: NodeId,
    /// Kind of the entry.
    pub kind: NodeKind,
    /// Stable cookie; restart a listing from `cookie + 1`.
    pub cookie: u64,
}

impl DirEntry {
    /// Returns `true` for the `.` and `..` entries.
    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.cookie < crate::node::FIRST_CHILD_COOKIE
    }
}

/// Serde support for SystemTime (when serde feature is enabled).
#[cfg(feature = "serde")]
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        (duration.as_secs(), duration.subsec_nanos()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (secs, nanos): (u64, u32) = Deserialize::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::new(secs, nanos))
    }
}
