//! Service configuration.

use crate::Access;

/// Configuration for a [`Devfs`](crate::Devfs) service.
///
/// # Example
///
/// ```rust
/// use devfs_core::{Access, DevfsConfig};
///
/// let config = DevfsConfig::default()
///     .with_thread_name("devfs-test")
///     .with_default_access(Access::new(0, 5, 0o660));
/// assert_eq!(config.max_link_depth, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DevfsConfig {
    /// Name of the core actor thread.
    pub thread_name: String,
    /// Access triple for nodes not backed by a device.
    pub default_access: Access,
    /// Mode for directories created on the way to a leaf or alias.
    pub dir_mode: u32,
    /// Symbolic-link hops followed by a lookup.
    pub max_link_depth: usize,
    /// Size of the implementation-unit id space.
    pub max_impl_units: u32,
    /// First node identity handed out.
    pub first_inode: u64,
}

impl Default for DevfsConfig {
    fn default() -> Self {
        Self {
            thread_name: "devfs-core".to_string(),
            default_access: Access::default(),
            dir_mode: 0o755,
            max_link_depth: 8,
            max_impl_units: 255,
            first_inode: 1,
        }
    }
}

impl DevfsConfig {
    /// Set the core actor thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the access triple for nodes not backed by a device.
    pub fn with_default_access(mut self, access: Access) -> Self {
        self.default_access = access;
        self
    }

    /// Set the mode of auto-created directories.
    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode & 0o7777;
        self
    }

    /// Set how many symbolic-link hops a lookup follows.
    pub fn with_max_link_depth(mut self, depth: usize) -> Self {
        self.max_link_depth = depth;
        self
    }

    /// Set the size of the implementation-unit id space.
    pub fn with_max_impl_units(mut self, units: u32) -> Self {
        self.max_impl_units = units;
        self
    }

    /// Set the first node identity.
    pub fn with_first_inode(mut self, inode: u64) -> Self {
        self.first_inode = inode;
        self
    }

    /// Access triple for auto-created directories.
    #[inline]
    pub(crate) fn dir_access(&self) -> Access {
        self.default_access.with_mode(self.dir_mode)
    }
}
