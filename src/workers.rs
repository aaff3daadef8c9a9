//! Mutation algorithms run by the core actor.
//!
//! Everything in this module operates on [`CoreState`] and is only ever
//! called from the actor thread with the master lock held. Callbacks into
//! user code (rule engine, clone handlers, object detach) are never made
//! from here; the dispatcher in `service` makes them with the state
//! released.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::alias::AliasRegistry;
use crate::clone::{CloneHandler, CloneHandlers};
use crate::ids::InoAllocator;
use crate::mount::{MountSelector, MountSpec, MountStats, MountView};
use crate::registry::Registry;
use crate::request::ScanEntry;
use crate::rules::{RulePass, RuleTarget};
use crate::tree::Tree;
use crate::vnode::Vnode;
use crate::{
    Access, DevfsConfig, DevfsError, DeviceFlags, DeviceHandle, DeviceId, ImplId, MinorSelector,
    MountId, NodeFlags, NodeId, NodeInfo, NodeKind,
};

/// One node waiting for the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RuleJob {
    pub(crate) mount: MountId,
    pub(crate) node: NodeId,
    pub(crate) pass: RulePass,
}

/// Everything behind the master lock.
pub(crate) struct CoreState {
    config: DevfsConfig,
    inos: Arc<InoAllocator>,
    pub(crate) devices: Registry,
    pub(crate) aliases: AliasRegistry,
    pub(crate) mounts: Vec<MountView>,
    pub(crate) clones: CloneHandlers,
    rule_queue: VecDeque<RuleJob>,
    /// Objects of nodes freed in views that no longer exist.
    detached: Vec<Arc<dyn Vnode>>,
}

impl fmt::Debug for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreState")
            .field("devices", &self.devices)
            .field("aliases", &self.aliases)
            .field("mounts", &self.mounts)
            .field("clones", &self.clones)
            .field("queued_rules", &self.rule_queue.len())
            .finish_non_exhaustive()
    }
}

impl CoreState {
    pub(crate) fn new(config: DevfsConfig, inos: Arc<InoAllocator>) -> Self {
        Self {
            config,
            inos,
            devices: Registry::default(),
            aliases: AliasRegistry::default(),
            mounts: Vec::new(),
            clones: CloneHandlers::default(),
            rule_queue: VecDeque::new(),
            detached: Vec::new(),
        }
    }

    pub(crate) fn view(&self, mount: MountId) -> Result<&MountView, DevfsError> {
        self.mounts
            .iter()
            .find(|v| v.id() == mount)
            .ok_or(DevfsError::MountNotFound { mount })
    }

    pub(crate) fn view_mut(&mut self, mount: MountId) -> Result<&mut MountView, DevfsError> {
        self.mounts
            .iter_mut()
            .find(|v| v.id() == mount)
            .ok_or(DevfsError::MountNotFound { mount })
    }

    pub(crate) fn mount_stats(&self, mount: MountId) -> Result<MountStats, DevfsError> {
        self.view(mount).map(MountView::stats)
    }

    /// External objects waiting to be told their node is gone.
    pub(crate) fn take_detached(&mut self) -> Vec<Arc<dyn Vnode>> {
        let mut out = std::mem::take(&mut self.detached);
        for view in &mut self.mounts {
            out.extend(view.tree.take_detached());
        }
        out
    }

    // ========================================================================
    // Device registration
    // ========================================================================

    /// Create the leaf for `dev` in one view, plus the mirrors of every alias
    /// that targets it.
    fn realize_leaf(
        tree: &mut Tree,
        aliases: &AliasRegistry,
        dev: &DeviceHandle,
    ) -> Option<NodeId> {
        let leaf = match tree.create_device_node(dev) {
            Ok(leaf) => leaf,
            Err(err) if err.is_benign() => return None,
            Err(err) => {
                warn!("{}: cannot create node for {}: {}", tree.mount(), dev.name(), err);
                return None;
            }
        };
        for alias in aliases.for_target(dev) {
            // Duplicates are logged by the tree and the existing node kept.
            let _ = tree.create_link(&alias.name, leaf, NodeFlags::empty());
        }
        Some(leaf)
    }

    pub(crate) fn register(&mut self, dev: DeviceHandle, access: Access) -> Result<(), DevfsError> {
        self.devices.link(dev.clone())?;
        dev.set_access(access);
        debug!("register {} ({}) with mode {:o}", dev.name(), dev.id(), access.mode);

        let aliases = &self.aliases;
        for view in &mut self.mounts {
            Self::realize_leaf(&mut view.tree, aliases, &dev);
        }
        Ok(())
    }

    /// Unlink one handle and remove it from every view. Descendants are
    /// left alone.
    fn destroy_device(&mut self, dev: &DeviceHandle) -> Result<(), DevfsError> {
        let registry_ref = self.devices.unlink(dev)?;
        let gone = self.aliases.remove_all_for(dev);
        if !gone.is_empty() {
            debug!("{}: dropped {} aliases", dev.name(), gone.len());
        }
        for view in &mut self.mounts {
            view.tree.destroy_device_node(dev);
        }
        debug!("unregistered {}", dev.name());
        drop(registry_ref);
        Ok(())
    }

    pub(crate) fn unregister(&mut self, dev: &DeviceHandle) -> Result<(), DevfsError> {
        if !dev.is_registered() {
            debug!("unregister: {} already removed", dev.name());
            return Err(DevfsError::AlreadyRemoved {
                name: dev.name().to_string(),
            });
        }
        self.destroy_descendants(dev);
        self.destroy_device(dev)
    }

    /// Destroy every handle derived from `needle`, depth first.
    ///
    /// The registry is rescanned from the start after each removal.
    pub(crate) fn destroy_descendants(&mut self, needle: &DeviceHandle) {
        while let Some(child) = self.devices.first_child_of(needle) {
            debug!("destroy descendants of {}: {}", needle.name(), child.name());
            self.destroy_descendants(&child);
            let _ = self.destroy_device(&child);
        }
    }

    /// Destroy every registered handle of `owner` with a matching minor.
    pub(crate) fn destroy_matching(&mut self, owner: ImplId, minor: MinorSelector) -> usize {
        let doomed: Vec<DeviceHandle> = self
            .devices
            .iter()
            .filter(|d| d.owner() == owner && minor.matches(d.minor()))
            .cloned()
            .collect();
        doomed.iter().filter(|d| self.destroy_device(d).is_ok()).count()
    }

    pub(crate) fn clear_flag_on_descendants(&mut self, needle: &DeviceHandle, flag: DeviceFlags) {
        for child in self.devices.children_of(needle) {
            self.clear_flag_on_descendants(&child, flag);
            child.remove_flags(flag);
        }
    }

    /// Destroy every descendant of `needle` that does not carry `flag`.
    /// Descendants of a destroyed handle are visited before it.
    pub(crate) fn destroy_descendants_without_flag(
        &mut self,
        needle: &DeviceHandle,
        flag: DeviceFlags,
    ) {
        'restart: loop {
            for child in self.devices.children_of(needle) {
                self.destroy_descendants_without_flag(&child, flag);
                if !child.flags().contains(flag) {
                    let _ = self.destroy_device(&child);
                    continue 'restart;
                }
            }
            break;
        }
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub(crate) fn find_by_name(&self, name: &str) -> Option<DeviceHandle> {
        self.devices
            .find_by_name(name)
            .cloned()
            .or_else(|| self.aliases.resolve(name))
    }

    pub(crate) fn find_by_identity(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.devices.find_by_identity(id).cloned()
    }

    /// Every handle, then every alias with a live target.
    pub(crate) fn scan(&self) -> Vec<ScanEntry> {
        let devices = self
            .devices
            .iter()
            .map(|d| (d.name().to_string(), d.clone(), false));
        let aliases = self
            .aliases
            .iter()
            .filter_map(|a| a.target.upgrade().map(|t| (a.name.clone(), t, true)));
        devices.chain(aliases).collect()
    }

    pub(crate) fn check_inode(&self, mount: MountId, inode: NodeId) -> bool {
        self.view(mount)
            .ok()
            .and_then(|v| v.tree.get(inode))
            .is_some_and(|n| n.is_linked())
    }

    // ========================================================================
    // Aliases
    // ========================================================================

    pub(crate) fn make_alias(
        &mut self,
        name: &str,
        target: &DeviceHandle,
    ) -> Result<(), DevfsError> {
        if name.is_empty() {
            warn!("make_alias: empty alias name for {}", target.name());
            return Err(DevfsError::InvalidName { name: name.into() });
        }
        let alias = self.aliases.insert(name, target)?;
        for view in &mut self.mounts {
            if let Some(leaf) = view.tree.find_device_leaf(target) {
                let _ = view.tree.create_link(&alias.name, leaf, NodeFlags::empty());
            }
        }
        debug!("alias {} -> {}", alias.name, target.name());
        Ok(())
    }

    pub(crate) fn destroy_alias(
        &mut self,
        pattern: &str,
        target: &DeviceHandle,
    ) -> Result<(), DevfsError> {
        let Some(alias) = self.aliases.take_first_match(pattern, target) else {
            warn!("destroy_alias: no alias matching {} on {}", pattern, target.name());
            return Err(DevfsError::not_found(pattern));
        };
        for view in &mut self.mounts {
            view.tree.destroy_link(&alias.name, target);
        }
        debug!("removed alias {} -> {}", alias.name, target.name());
        Ok(())
    }

    // ========================================================================
    // Mounts
    // ========================================================================

    pub(crate) fn add_mount(&mut self, spec: MountSpec) -> Result<(), DevfsError> {
        if self.view(spec.id).is_ok() {
            return Err(DevfsError::exists(spec.id.to_string(), "add_mount"));
        }
        let mut tree = Tree::new(spec.id, Arc::clone(&self.inos), &self.config)?;
        for dev in self.devices.iter() {
            Self::realize_leaf(&mut tree, &self.aliases, dev);
        }
        info!(
            "{} mounted at {} with {} devices",
            spec.id,
            spec.mount_point,
            self.devices.len()
        );
        self.mounts.push(MountView::new(spec, tree));
        Ok(())
    }

    /// Tear a view down. Returns how many nodes had to be reaped as leaks.
    pub(crate) fn remove_mount(&mut self, mount: MountId) -> Result<usize, DevfsError> {
        let pos = self
            .mounts
            .iter()
            .position(|v| v.id() == mount)
            .ok_or(DevfsError::MountNotFound { mount })?;
        let mut view = self.mounts.remove(pos);
        let leaked = view.tree.reap_all();
        view.leaked_total += leaked;
        if leaked > 0 {
            warn!("{}: leaked {} nodes ({} over its lifetime)", mount, leaked, view.leaked_total);
        }
        self.detached.extend(view.tree.take_detached());
        self.rule_queue.retain(|job| job.mount != mount);
        info!("{} at {} unmounted", mount, view.spec.mount_point);
        Ok(leaked)
    }

    // ========================================================================
    // Clone handlers
    // ========================================================================

    pub(crate) fn add_clone_handler(
        &mut self,
        name: &str,
        handler: Arc<dyn CloneHandler>,
    ) -> Result<(), DevfsError> {
        self.clones.add(name, handler)?;
        debug!("clone handler {name} added, {} registered", self.clones.len());
        Ok(())
    }

    pub(crate) fn remove_clone_handler(&mut self, name: &str) -> Result<(), DevfsError> {
        self.clones.remove(name)
    }

    /// Ensure `dev` has a leaf in `mount` and describe it. The leaf is only
    /// created in that view.
    pub(crate) fn finish_clone(
        &mut self,
        mount: MountId,
        dev: &DeviceHandle,
    ) -> Result<NodeInfo, DevfsError> {
        let aliases = &self.aliases;
        let view = self
            .mounts
            .iter_mut()
            .find(|v| v.id() == mount)
            .ok_or(DevfsError::MountNotFound { mount })?;
        let leaf = match view.tree.find_device_leaf(dev) {
            Some(leaf) => leaf,
            None => Self::realize_leaf(&mut view.tree, aliases, dev)
                .ok_or_else(|| DevfsError::not_found(dev.name()))?,
        };
        view.info(leaf)
    }

    /// Tear every view down and forget the clone handlers.
    pub(crate) fn shutdown(&mut self) -> usize {
        self.clones = CloneHandlers::default();
        let ids: Vec<MountId> = self.mounts.iter().map(MountView::id).collect();
        ids.into_iter().filter_map(|m| self.remove_mount(m).ok()).sum()
    }

    // ========================================================================
    // User operations
    // ========================================================================

    pub(crate) fn make_dir(
        &mut self,
        mount: MountId,
        path: &str,
        access: Access,
    ) -> Result<NodeInfo, DevfsError> {
        let view = self.view_mut(mount)?;
        let id = view.tree.make_dir(path, access)?;
        view.info(id)
    }

    pub(crate) fn make_symlink(
        &mut self,
        mount: MountId,
        path: &str,
        target: &str,
    ) -> Result<NodeInfo, DevfsError> {
        let view = self.view_mut(mount)?;
        let id = view.tree.make_symlink(path, target)?;
        view.info(id)
    }

    pub(crate) fn remove(
        &mut self,
        mount: MountId,
        path: &str,
        dir: bool,
    ) -> Result<(), DevfsError> {
        self.view_mut(mount)?.tree.remove_user_node(path, dir)
    }

    pub(crate) fn reclaim(&mut self, mount: MountId, inode: NodeId) {
        match self.view_mut(mount) {
            Ok(view) => view.tree.reclaim(inode),
            Err(_) => debug!("reclaim of {inode} on unmounted {mount}"),
        }
    }

    // ========================================================================
    // Rules
    // ========================================================================

    /// Queue every node of the selected views for a rule pass.
    pub(crate) fn queue_rules(&mut self, selector: &MountSelector, pass: RulePass) {
        let selected = self
            .mounts
            .iter()
            .filter(|v| selector.matches(&v.spec.mount_point));
        for view in selected {
            let mount = view.id();
            let nodes = view.tree.post_order(view.tree.root());
            self.rule_queue.extend(nodes.into_iter().map(|node| RuleJob { mount, node, pass }));
        }
    }

    fn queue_fresh(&mut self) {
        for view in &mut self.mounts {
            let mount = view.id();
            let fresh = view.tree.take_fresh();
            self.rule_queue.extend(fresh.into_iter().map(|node| RuleJob {
                mount,
                node,
                pass: RulePass::Apply,
            }));
        }
    }

    /// Next node for the rule engine, with its editable snapshot.
    ///
    /// Links created by rules are removed outright on a reset pass instead of
    /// being offered.
    pub(crate) fn next_rule_job(&mut self) -> Option<(RuleJob, RuleTarget)> {
        self.queue_fresh();
        while let Some(job) = self.rule_queue.pop_front() {
            let Some(view) = self.mounts.iter_mut().find(|v| v.id() == job.mount) else {
                continue;
            };
            let Some(node) = view.tree.get(job.node) else {
                continue;
            };
            if job.pass == RulePass::Reset && node.flags.contains(NodeFlags::RULE_CREATED) {
                view.tree.collect(job.node);
                continue;
            }

            let device = node.device.as_ref().and_then(|d| d.upgrade());
            let default_access = match (&device, node.kind) {
                (Some(dev), _) => dev.access(),
                (None, NodeKind::Root | NodeKind::Directory) => self.config.dir_access(),
                (None, _) => self.config.default_access,
            };
            let target = RuleTarget::new(
                node.info(job.mount),
                &view.spec.mount_point,
                device.map(|d| d.name().to_string()),
                default_access,
            );
            return Some((job, target));
        }
        None
    }

    /// Commit a rule engine's edits if the node still exists.
    pub(crate) fn commit_rule(&mut self, job: RuleJob, target: RuleTarget) {
        let Ok(view) = self.view_mut(job.mount) else {
            return;
        };
        let Some(node) = view.tree.get_mut(job.node) else {
            return;
        };
        let (set, clear) = target.flags();
        node.access = target.access();
        node.flags.remove(clear);
        node.flags.insert(set);

        for link in target.into_links() {
            if let Err(err) = view.tree.create_link(&link, job.node, NodeFlags::RULE_CREATED) {
                if !err.is_benign() {
                    warn!("{}: rule link {} not created: {}", job.mount, link, err);
                }
            }
        }
    }
}
