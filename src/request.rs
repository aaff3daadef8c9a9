//! Request Channel messages.
//!
//! Each command carries its payload and, for synchronous commands, the
//! sending half of a private one-shot reply channel. Fire-and-forget
//! commands carry no reply address at all.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::clone::CloneHandler;
use crate::mount::{MountSelector, MountSpec};
use crate::{
    Access, DevfsError, DeviceFlags, DeviceHandle, DeviceId, ImplId, MinorSelector, MountId, NodeId,
    NodeInfo,
};

/// One reply address; the requester holds the receiving half.
pub(crate) type Reply<T> = Sender<T>;

/// One entry of a registry scan: name, target handle, and whether the
/// entry is an alias.
pub(crate) type ScanEntry = (String, DeviceHandle, bool);

pub(crate) enum Command {
    // Fire-and-forget
    Register {
        device: DeviceHandle,
        access: Access,
    },
    Unregister {
        device: DeviceHandle,
    },
    MakeAlias {
        name: String,
        target: DeviceHandle,
    },
    DestroyAlias {
        pattern: String,
        target: DeviceHandle,
    },
    ApplyRules {
        selector: MountSelector,
    },
    ResetRules {
        selector: MountSelector,
    },

    // Synchronous
    DestroyDescendants {
        device: DeviceHandle,
        reply: Reply<()>,
    },
    DestroyMatching {
        owner: ImplId,
        minor: MinorSelector,
        reply: Reply<usize>,
    },
    ClearFlagOnDescendants {
        device: DeviceHandle,
        flag: DeviceFlags,
        reply: Reply<()>,
    },
    DestroyDescendantsWithoutFlag {
        device: DeviceHandle,
        flag: DeviceFlags,
        reply: Reply<()>,
    },
    AddMount {
        spec: MountSpec,
        reply: Reply<Result<(), DevfsError>>,
    },
    RemoveMount {
        mount: MountId,
        reply: Reply<Result<usize, DevfsError>>,
    },
    AddCloneHandler {
        name: String,
        handler: Arc<dyn CloneHandler>,
        reply: Reply<Result<(), DevfsError>>,
    },
    RemoveCloneHandler {
        name: String,
        reply: Reply<Result<(), DevfsError>>,
    },
    OpenClone {
        mount: MountId,
        name: String,
        reply: Reply<Result<NodeInfo, DevfsError>>,
    },
    FindByName {
        name: String,
        reply: Reply<Option<DeviceHandle>>,
    },
    FindByIdentity {
        id: DeviceId,
        reply: Reply<Option<DeviceHandle>>,
    },
    Scan {
        reply: Reply<Vec<ScanEntry>>,
    },
    CheckInode {
        mount: MountId,
        inode: NodeId,
        reply: Reply<bool>,
    },
    MakeDir {
        mount: MountId,
        path: String,
        access: Access,
        reply: Reply<Result<NodeInfo, DevfsError>>,
    },
    MakeSymlink {
        mount: MountId,
        path: String,
        target: String,
        reply: Reply<Result<NodeInfo, DevfsError>>,
    },
    Remove {
        mount: MountId,
        path: String,
        dir: bool,
        reply: Reply<Result<(), DevfsError>>,
    },
    Reclaim {
        mount: MountId,
        inode: NodeId,
        reply: Reply<()>,
    },
    Sync {
        reply: Reply<()>,
    },
    Terminate {
        reply: Reply<()>,
    },
}

impl Command {
    /// Short name for logging.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Command::Register { .. } => "register",
            Command::Unregister { .. } => "unregister",
            Command::MakeAlias { .. } => "make_alias",
            Command::DestroyAlias { .. } => "destroy_alias",
            Command::ApplyRules { .. } => "apply_rules",
            Command::ResetRules { .. } => "reset_rules",
            Command::DestroyDescendants { .. } => "destroy_descendants",
            Command::DestroyMatching { .. } => "destroy_matching",
            Command::ClearFlagOnDescendants { .. } => "clear_flag_on_descendants",
            Command::DestroyDescendantsWithoutFlag { .. } => "destroy_descendants_without_flag",
            Command::AddMount { .. } => "add_mount",
            Command::RemoveMount { .. } => "remove_mount",
            Command::AddCloneHandler { .. } => "add_clone_handler",
            Command::RemoveCloneHandler { .. } => "remove_clone_handler",
            Command::OpenClone { .. } => "open_clone",
            Command::FindByName { .. } => "find_by_name",
            Command::FindByIdentity { .. } => "find_by_identity",
            Command::Scan { .. } => "scan",
            Command::CheckInode { .. } => "node_for_inode",
            Command::MakeDir { .. } => "make_dir",
            Command::MakeSymlink { .. } => "make_symlink",
            Command::Remove { .. } => "remove",
            Command::Reclaim { .. } => "reclaim",
            Command::Sync { .. } => "sync",
            Command::Terminate { .. } => "terminate",
        }
    }
}
