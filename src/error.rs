//! Error types for the device namespace service.

use crate::{MountId, NodeId};

/// Error type for namespace operations, with contextual variants.
///
/// Most variants never reach fire-and-forget callers: the core actor logs
/// them and carries on. They surface only from synchronous operations that
/// can legitimately fail (mount management, clone handlers, user namespace
/// operations, materialization).
///
/// # Examples
///
/// ```rust
/// use devfs_core::DevfsError;
///
/// let err = DevfsError::NotFound { name: "ttyS0".into() };
/// assert_eq!(err.to_string(), "not found: ttyS0");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DevfsError {
    // Name/Path Errors
    /// Name or path does not exist.
    #[error("not found: {name}")]
    NotFound {
        /// The name or path that was not found.
        name: String,
    },

    /// Node identity does not exist (or is no longer linked) in the view.
    #[error("inode not found: {inode}")]
    InodeNotFound {
        /// The node identity that was not found.
        inode: NodeId,
    },

    /// Entry already exists. Benign for duplicate registrations and aliases.
    #[error("{operation}: already exists: {name}")]
    AlreadyExists {
        /// The duplicated name.
        name: String,
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// Handle was already unlinked from the registry.
    #[error("already removed: {name}")]
    AlreadyRemoved {
        /// Name of the handle.
        name: String,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {name}")]
    NotADirectory {
        /// The offending path component.
        name: String,
    },

    /// Expected a non-directory but found a directory.
    #[error("is a directory: {name}")]
    IsADirectory {
        /// The directory path.
        name: String,
    },

    /// Directory still has children.
    #[error("directory not empty: {name}")]
    DirectoryNotEmpty {
        /// The directory path.
        name: String,
    },

    /// Only user-created nodes may be removed by user operations.
    #[error("{operation}: permission denied: {name}")]
    PermissionDenied {
        /// The path of the node.
        name: String,
        /// The operation that was denied.
        operation: &'static str,
    },

    /// Name is empty or otherwise unusable.
    #[error("invalid name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Symbolic-link chain longer than the configured hop limit.
    #[error("too many levels of symbolic links: {name}")]
    TooManyLinks {
        /// The path being resolved.
        name: String,
    },

    /// No mount view with this identity is registered.
    #[error("mount not found: {mount}")]
    MountNotFound {
        /// The unknown mount identity.
        mount: MountId,
    },

    // Resource/State Errors
    /// External object is being torn down; the materializer retries.
    #[error("busy")]
    Busy,

    /// An identity allocator ran out of identities.
    #[error("resource exhausted: {resource}")]
    ResourceExhausted {
        /// The allocator that is exhausted.
        resource: &'static str,
    },

    /// The core actor is no longer running.
    #[error("devfs core is not running")]
    Stopped,

    /// Failure reported by an external object allocator.
    #[error("backend error: {0}")]
    Backend(String),
}

impl DevfsError {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub(crate) fn exists(name: impl Into<String>, operation: &'static str) -> Self {
        Self::AlreadyExists {
            name: name.into(),
            operation,
        }
    }

    /// Returns `true` for outcomes that callers treat as a successful no-op.
    #[inline]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. } | Self::AlreadyRemoved { .. })
    }
}
