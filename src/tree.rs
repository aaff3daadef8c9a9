//! # Namespace Tree
//!
//! One tree per mount view. Nodes live in an arena keyed by [`NodeId`];
//! parent and link-target references are ids, so a freed node can never be
//! reached through a stale pointer, only through a failed lookup.
//!
//! ## Node lifecycle
//!
//! ```text
//! alloc ──▶ linked into parent ──unlink──▶ orphan list ──free──▶ gone
//! ```
//!
//! A node is either linked under one parent or sits on the orphan list,
//! never both. Freeing is allowed exactly once; a second free of the same
//! node is a locking-discipline violation and panics.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{trace, warn};

use crate::ids::InoAllocator;
use crate::node::{FIRST_CHILD_COOKIE, Node};
use crate::path::{components, is_valid_entry_name, split_name};
use crate::vnode::Vnode;
use crate::{
    Access, DevfsConfig, DevfsError, DeviceHandle, DirEntry, MountId, NodeFlags, NodeId, NodeKind,
};

/// Directory graph of one mount view.
pub(crate) struct Tree {
    mount: MountId,
    root: NodeId,
    nodes: HashMap<NodeId, Node>,
    orphans: Vec<NodeId>,
    inos: Arc<InoAllocator>,
    default_access: Access,
    dir_access: Access,
    /// Allocated and not yet freed.
    live: usize,
    /// Allocated since the last drain; waiting for the rule engine.
    fresh: Vec<NodeId>,
    /// Objects of freed nodes, detached once the master lock is released.
    detached: Vec<Arc<dyn Vnode>>,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("mount", &self.mount)
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("orphans", &self.orphans)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl Tree {
    pub(crate) fn new(
        mount: MountId,
        inos: Arc<InoAllocator>,
        config: &DevfsConfig,
    ) -> Result<Self, DevfsError> {
        let mut tree = Self {
            mount,
            root: NodeId(0),
            nodes: HashMap::new(),
            orphans: Vec::new(),
            inos,
            default_access: config.default_access,
            dir_access: config.dir_access(),
            live: 0,
            fresh: Vec::new(),
            detached: Vec::new(),
        };
        tree.root = tree.alloc(NodeKind::Root, "", None, tree.dir_access)?;
        Ok(tree)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub(crate) fn mount(&self) -> MountId {
        self.mount
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn take_fresh(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.fresh)
    }

    pub(crate) fn take_detached(&mut self) -> Vec<Arc<dyn Vnode>> {
        std::mem::take(&mut self.detached)
    }

    // ========================================================================
    // Allocation, unlink and free
    // ========================================================================

    /// Allocate a node and, when `parent` is a directory, link it there with
    /// the parent's next cookie.
    pub(crate) fn alloc(
        &mut self,
        kind: NodeKind,
        name: &str,
        parent: Option<NodeId>,
        access: Access,
    ) -> Result<NodeId, DevfsError> {
        let id = self.inos.fetch()?;
        let mut node = Node::new(id, kind, name, access);

        if let Some(p) = parent
            .and_then(|pid| self.nodes.get_mut(&pid))
            .filter(|p| p.is_dir())
        {
            node.cookie = p.cookie_jar;
            p.cookie_jar += 1;
            p.children.push(id);
            p.touch();
            node.parent = Some(p.id);
            node.flags.insert(NodeFlags::LINKED);
        }

        trace!("{}: alloc {:?} {} as {}", self.mount, kind, name, id);
        self.nodes.insert(id, node);
        self.live += 1;
        self.fresh.push(id);
        Ok(id)
    }

    /// Detach a node from its parent and put it on the orphan list.
    pub(crate) fn unlink(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        assert!(
            !node.flags.contains(NodeFlags::ORPHANED),
            "{}: node {} orphaned twice",
            self.mount,
            id
        );
        node.flags.insert(NodeFlags::ORPHANED);
        self.orphans.push(id);

        if let Some(pid) = node.parent.take() {
            node.flags.remove(NodeFlags::LINKED);
            if let Some(parent) = self.nodes.get_mut(&pid) {
                parent.children.retain(|c| *c != id);
                parent.touch();
            }
        }
    }

    /// Free an unlinked node. Any bound external object is queued for detach.
    ///
    /// # Panics
    ///
    /// Panics on a double free or when the node is still linked.
    pub(crate) fn free(&mut self, id: NodeId) {
        let Some(mut node) = self.nodes.remove(&id) else {
            panic!("{}: double free of node {}", self.mount, id);
        };
        assert!(
            !node.is_linked() || node.kind == NodeKind::Root,
            "{}: freeing linked node {}",
            self.mount,
            id
        );
        debug_assert!(node.children.is_empty(), "freeing non-empty directory");
        node.flags.insert(NodeFlags::DESTROYED);

        if node.flags.contains(NodeFlags::ORPHANED) {
            self.orphans.retain(|o| *o != id);
        }
        if let Some(target) = node.link_target.and_then(|t| self.nodes.get_mut(&t)) {
            target.nlinks = target.nlinks.saturating_sub(1);
        }
        if let Some(vnode) = node.vnode.take() {
            self.detached.push(vnode);
        }
        self.live -= 1;
        trace!("{}: freed {} ({})", self.mount, id, node.name);
    }

    /// Post-order snapshot of the subtree at `from`; children before parents.
    pub(crate) fn post_order(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.post_order_into(from, &mut out);
        out
    }

    fn post_order_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for child in &node.children {
            self.post_order_into(*child, out);
        }
        out.push(id);
    }

    /// Unlink and free every node, then free whatever is left on the orphan
    /// list. Returns how many orphans had to be reaped that way.
    pub(crate) fn reap_all(&mut self) -> usize {
        for id in self.post_order(self.root) {
            self.unlink(id);
            self.free(id);
        }
        let leaked = std::mem::take(&mut self.orphans);
        for id in &leaked {
            if let Some(node) = self.nodes.get_mut(id) {
                node.flags.remove(NodeFlags::ORPHANED);
            }
            self.free(*id);
        }
        leaked.len()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    pub(crate) fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let parent = self.nodes.get(&parent)?;
        parent
            .children
            .iter()
            .copied()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.name == name))
    }

    /// Walk `path` below `from` by exact name, allocating missing
    /// directories when `create` is set.
    pub(crate) fn resolve_or_create(
        &mut self,
        from: NodeId,
        path: &str,
        create: bool,
    ) -> Result<NodeId, DevfsError> {
        let mut cur = from;
        for seg in components(path) {
            cur = match self.find_child(cur, seg) {
                Some(id) if self.nodes.get(&id).is_some_and(Node::is_dir) => id,
                Some(_) => {
                    return Err(DevfsError::NotADirectory {
                        name: seg.to_string(),
                    });
                }
                None if create => self.alloc(NodeKind::Directory, seg, Some(cur), self.dir_access)?,
                None => return Err(DevfsError::not_found(path)),
            };
        }
        Ok(cur)
    }

    /// Create the leaf for `dev`, placed by its name.
    ///
    /// A name that already exists at that location is rejected and the
    /// existing node is kept.
    pub(crate) fn create_device_node(&mut self, dev: &DeviceHandle) -> Result<NodeId, DevfsError> {
        let (dir, name) = split_name(dev.name());
        if !is_valid_entry_name(name) {
            return Err(DevfsError::InvalidName {
                name: dev.name().to_string(),
            });
        }
        let parent = self.resolve_or_create(self.root, dir.unwrap_or(""), true)?;
        if self.find_child(parent, name).is_some() {
            warn!(
                "{}: device {} already exists, ignoring creation request",
                self.mount,
                dev.name()
            );
            return Err(DevfsError::exists(dev.name(), "create_device_node"));
        }

        let id = self.alloc(NodeKind::DeviceLeaf, name, Some(parent), dev.access())?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.device = Some(dev.downgrade());
            node.device_id = Some(dev.id());
        }
        Ok(id)
    }

    /// Create a symbolic link at `link_path` (relative to the root) pointing
    /// at node `target`, and count it on the target.
    pub(crate) fn create_link(
        &mut self,
        link_path: &str,
        target: NodeId,
        flags: NodeFlags,
    ) -> Result<NodeId, DevfsError> {
        let (dir, name) = split_name(link_path);
        if !is_valid_entry_name(name) {
            return Err(DevfsError::InvalidName {
                name: link_path.to_string(),
            });
        }
        let parent = self.resolve_or_create(self.root, dir.unwrap_or(""), true)?;
        if self.find_child(parent, name).is_some() {
            warn!("{}: node {} already exists, not creating link", self.mount, link_path);
            return Err(DevfsError::exists(link_path, "create_link"));
        }

        let id = self.alloc(NodeKind::SymbolicLink, name, Some(parent), self.default_access)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.link_target = Some(target);
            node.flags.insert(flags);
        }
        if let Some(t) = self.nodes.get_mut(&target) {
            t.nlinks += 1;
        }
        Ok(id)
    }

    /// The leaf for `dev`, found through the device's own name.
    pub(crate) fn find_device_leaf(&self, dev: &DeviceHandle) -> Option<NodeId> {
        let (dir, name) = split_name(dev.name());
        let mut cur = self.root;
        for seg in components(dir.unwrap_or("")) {
            cur = self.find_child(cur, seg)?;
        }
        let id = self.find_child(cur, name)?;
        let node = self.nodes.get(&id)?;
        let is_leaf =
            node.kind == NodeKind::DeviceLeaf && node.device.as_ref().is_some_and(|d| d.is(dev));
        is_leaf.then_some(id)
    }

    /// Mount-relative path of a node, `""` for the root.
    pub(crate) fn path_of(&self, id: NodeId) -> String {
        let chain = self.ancestry(id);
        crate::path::join(
            chain
                .iter()
                .skip(1)
                .filter_map(|n| self.nodes.get(n))
                .map(|n| n.name.as_str()),
        )
    }

    /// Ids from the root down to `id`, inclusive.
    fn ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut cur = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(pid) = cur {
            chain.push(pid);
            cur = self.nodes.get(&pid).and_then(|n| n.parent);
        }
        chain.reverse();
        chain
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Resolve a mount-relative path. Symbolic links are followed, the last
    /// component only when `follow_last` is set. Hidden nodes do not exist.
    pub(crate) fn lookup(
        &self,
        path: &str,
        follow_last: bool,
        max_hops: usize,
    ) -> Result<NodeId, DevfsError> {
        let mut hops = 0;
        self.walk(self.root, path, follow_last, max_hops, &mut hops)
    }

    fn walk(
        &self,
        start: NodeId,
        path: &str,
        follow_last: bool,
        max_hops: usize,
        hops: &mut usize,
    ) -> Result<NodeId, DevfsError> {
        let segs: Vec<&str> = components(path).collect();
        let mut cur = start;
        for (i, seg) in segs.iter().enumerate() {
            let dir = self
                .nodes
                .get(&cur)
                .ok_or_else(|| DevfsError::not_found(path))?;
            if !dir.is_dir() {
                return Err(DevfsError::NotADirectory {
                    name: path.to_string(),
                });
            }
            cur = match *seg {
                "." => cur,
                ".." => dir.parent.unwrap_or(cur),
                name => {
                    let child = self
                        .find_child(cur, name)
                        .ok_or_else(|| DevfsError::not_found(path))?;
                    if self.nodes.get(&child).is_some_and(Node::is_hidden) {
                        return Err(DevfsError::not_found(path));
                    }
                    child
                }
            };
            if i + 1 < segs.len() || follow_last {
                cur = self.follow(cur, path, max_hops, hops)?;
            }
        }
        Ok(cur)
    }

    fn follow(
        &self,
        mut cur: NodeId,
        path: &str,
        max_hops: usize,
        hops: &mut usize,
    ) -> Result<NodeId, DevfsError> {
        loop {
            let node = self
                .nodes
                .get(&cur)
                .ok_or_else(|| DevfsError::not_found(path))?;
            if node.kind != NodeKind::SymbolicLink {
                return Ok(cur);
            }
            *hops += 1;
            if *hops > max_hops {
                return Err(DevfsError::TooManyLinks {
                    name: path.to_string(),
                });
            }
            cur = match (&node.link_target, &node.symlink_text) {
                (Some(target), _) => {
                    let t = self
                        .nodes
                        .get(target)
                        .ok_or_else(|| DevfsError::not_found(path))?;
                    if t.is_hidden() {
                        return Err(DevfsError::not_found(path));
                    }
                    *target
                }
                (None, Some(text)) => {
                    let base = if text.starts_with('/') {
                        self.root
                    } else {
                        node.parent.unwrap_or(self.root)
                    };
                    self.walk(base, text, true, max_hops, hops)?
                }
                (None, None) => return Err(DevfsError::not_found(path)),
            };
        }
    }

    /// Entries of a directory with cookie `>= from_cookie`.
    pub(crate) fn read_dir(
        &self,
        dir: NodeId,
        from_cookie: u64,
    ) -> Result<Vec<DirEntry>, DevfsError> {
        let node = self
            .nodes
            .get(&dir)
            .ok_or(DevfsError::InodeNotFound { inode: dir })?;
        if !node.is_dir() {
            return Err(DevfsError::NotADirectory {
                name: self.path_of(dir),
            });
        }

        let mut entries = Vec::with_capacity(node.children.len() + 2);
        if from_cookie == 0 {
            entries.push(DirEntry {
                name: ".".into(),
                inode: node.id,
                kind: node.kind,
                cookie: 0,
            });
        }
        if from_cookie <= 1 {
            let parent = node
                .parent
                .and_then(|p| self.nodes.get(&p))
                .unwrap_or(node);
            entries.push(DirEntry {
                name: "..".into(),
                inode: parent.id,
                kind: parent.kind,
                cookie: 1,
            });
        }

        let start = from_cookie.max(FIRST_CHILD_COOKIE);
        for child in node.children.iter().filter_map(|c| self.nodes.get(c)) {
            if child.cookie < start || !self.is_listed(child) {
                continue;
            }
            entries.push(DirEntry {
                name: child.name.clone(),
                inode: child.id,
                kind: child.kind,
                cookie: child.cookie,
            });
        }
        Ok(entries)
    }

    fn is_listed(&self, node: &Node) -> bool {
        if node.flags.intersects(NodeFlags::HIDDEN | NodeFlags::INVISIBLE) {
            return false;
        }
        match node.link_target.and_then(|t| self.nodes.get(&t)) {
            Some(target) => !target.is_hidden(),
            None => true,
        }
    }

    /// Target text of a symbolic link. Links to nodes report the target's
    /// path relative to the link's directory.
    pub(crate) fn read_link(&self, id: NodeId) -> Result<String, DevfsError> {
        let node = self
            .nodes
            .get(&id)
            .ok_or(DevfsError::InodeNotFound { inode: id })?;
        if node.kind != NodeKind::SymbolicLink {
            return Err(DevfsError::InvalidName {
                name: self.path_of(id),
            });
        }
        if let Some(text) = &node.symlink_text {
            return Ok(text.clone());
        }
        let target = node
            .link_target
            .filter(|t| self.nodes.contains_key(t))
            .ok_or_else(|| DevfsError::not_found(self.path_of(id)))?;

        let from = self.ancestry(node.parent.unwrap_or(self.root));
        let to = self.ancestry(target);
        let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
        let ups = std::iter::repeat_n("..", from.len() - common);
        let downs = to[common..]
            .iter()
            .filter_map(|n| self.nodes.get(n))
            .map(|n| n.name.as_str());
        Ok(crate::path::join(ups.chain(downs)))
    }

    // ========================================================================
    // User operations
    // ========================================================================

    fn user_parent<'p>(&self, path: &'p str) -> Result<(NodeId, &'p str), DevfsError> {
        let (dir, name) = split_name(path.trim_end_matches('/'));
        if !is_valid_entry_name(name) {
            return Err(DevfsError::InvalidName { name: path.to_string() });
        }
        let mut hops = 0;
        let parent = self.walk(self.root, dir.unwrap_or(""), true, usize::MAX, &mut hops)?;
        if !self.nodes.get(&parent).is_some_and(Node::is_dir) {
            return Err(DevfsError::NotADirectory { name: path.to_string() });
        }
        if self.find_child(parent, name).is_some() {
            return Err(DevfsError::exists(path, "create"));
        }
        Ok((parent, name))
    }

    pub(crate) fn make_dir(&mut self, path: &str, access: Access) -> Result<NodeId, DevfsError> {
        let (parent, name) = self.user_parent(path)?;
        let id = self.alloc(NodeKind::Directory, name, Some(parent), access)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.flags.insert(NodeFlags::USER_CREATED);
        }
        Ok(id)
    }

    pub(crate) fn make_symlink(&mut self, path: &str, text: &str) -> Result<NodeId, DevfsError> {
        if text.is_empty() {
            return Err(DevfsError::InvalidName { name: text.to_string() });
        }
        let (parent, name) = self.user_parent(path)?;
        let access = self.default_access.with_mode(0o777);
        let id = self.alloc(NodeKind::SymbolicLink, name, Some(parent), access)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.flags.insert(NodeFlags::USER_CREATED);
            node.symlink_text = Some(text.to_string());
        }
        Ok(id)
    }

    /// Remove a user-created node. A node with a bound external object is
    /// left on the orphan list until the object is reclaimed.
    pub(crate) fn remove_user_node(
        &mut self,
        path: &str,
        want_dir: bool,
    ) -> Result<(), DevfsError> {
        let operation = if want_dir { "remove_dir" } else { "remove" };
        let mut hops = 0;
        let id = self.walk(self.root, path, false, usize::MAX, &mut hops)?;
        let node = self.nodes.get(&id).ok_or_else(|| DevfsError::not_found(path))?;

        if node.kind == NodeKind::Root || !node.flags.contains(NodeFlags::USER_CREATED) {
            return Err(DevfsError::PermissionDenied {
                name: path.to_string(),
                operation,
            });
        }
        match (node.is_dir(), want_dir) {
            (true, false) => return Err(DevfsError::IsADirectory { name: path.to_string() }),
            (false, true) => return Err(DevfsError::NotADirectory { name: path.to_string() }),
            (true, true) if !node.children.is_empty() => {
                return Err(DevfsError::DirectoryNotEmpty { name: path.to_string() });
            }
            _ => {}
        }

        if node.nlinks > 0 {
            self.purge_links_to(id);
        }
        let bound = self.nodes.get(&id).is_some_and(|n| n.vnode.is_bound());
        self.unlink(id);
        if !bound {
            self.free(id);
        }
        Ok(())
    }

    /// The external object of `id` is being destroyed: drop the
    /// back-reference and free the node if it is no longer linked.
    pub(crate) fn reclaim(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.vnode.take();
        if !node.is_linked() && node.kind != NodeKind::Root {
            self.free(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BitmapIdAllocator, ImplTable};
    use crate::{DeviceSpec, ImplId};
    use parking_lot::Mutex;

    fn tree() -> Tree {
        let inos = Arc::new(InoAllocator::new(1));
        Tree::new(MountId(1), inos, &DevfsConfig::default()).unwrap()
    }

    fn device(name: &str) -> DeviceHandle {
        let units = Arc::new(Mutex::new(ImplTable::new(Box::new(
            BitmapIdAllocator::new(8),
        ))));
        let spec = DeviceSpec::new(name, ImplId(1), 0);
        DeviceHandle::create(spec, &units, Access::new(0, 0, 0o640)).unwrap()
    }

    fn real_names(t: &Tree, dir: NodeId) -> Vec<String> {
        t.read_dir(dir, 0)
            .unwrap()
            .into_iter()
            .filter(|e| !e.is_synthetic())
            .map(|e| e.name)
            .collect()
    }

    #[test]
    fn resolve_or_create_is_stable() {
        let mut t = tree();
        let root = t.root();
        let c = t.resolve_or_create(root, "a/b/c", true).unwrap();
        assert_eq!(t.resolve_or_create(root, "a/b/c", false).unwrap(), c);
        assert!(matches!(
            t.resolve_or_create(root, "a/b/x", false),
            Err(DevfsError::NotFound { .. })
        ));
        assert_eq!(t.path_of(c), "a/b/c");
    }

    #[test]
    fn resolve_through_leaf_is_not_a_directory() {
        let mut t = tree();
        let dev = device("tty0");
        t.create_device_node(&dev).unwrap();
        let root = t.root();
        assert!(matches!(
            t.resolve_or_create(root, "tty0/x", true),
            Err(DevfsError::NotADirectory { .. })
        ));
    }

    #[test]
    fn device_name_implies_directories() {
        let mut t = tree();
        let dev = device("foo/0");
        let leaf = t.create_device_node(&dev).unwrap();
        let foo = t.find_child(t.root(), "foo").unwrap();
        assert_eq!(t.get(leaf).unwrap().parent, Some(foo));
        assert_eq!(t.get(leaf).unwrap().access.mode, 0o640);
        assert_eq!(real_names(&t, foo), ["0"]);
        assert_eq!(t.find_device_leaf(&dev), Some(leaf));
    }

    #[test]
    fn duplicate_leaf_keeps_existing() {
        let mut t = tree();
        let first = device("null");
        let second = device("null");
        let leaf = t.create_device_node(&first).unwrap();
        assert!(t.create_device_node(&second).unwrap_err().is_benign());
        assert_eq!(t.find_device_leaf(&first), Some(leaf));
        assert_eq!(t.find_device_leaf(&second), None);
    }

    #[test]
    fn cookies_are_monotonic_and_not_reused() {
        let mut t = tree();
        let root = t.root();
        let a = t
            .alloc(NodeKind::RegularFile, "a", Some(root), Access::default())
            .unwrap();
        let b = t
            .alloc(NodeKind::RegularFile, "b", Some(root), Access::default())
            .unwrap();
        assert_eq!(t.get(a).unwrap().cookie, 2);
        assert_eq!(t.get(b).unwrap().cookie, 3);

        t.unlink(a);
        t.free(a);
        let c = t
            .alloc(NodeKind::RegularFile, "c", Some(root), Access::default())
            .unwrap();
        assert_eq!(t.get(c).unwrap().cookie, 4);

        let from_three: Vec<_> = t
            .read_dir(root, 3)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(from_three, ["b", "c"]);
    }

    #[test]
    fn read_dir_synthetic_entries() {
        let mut t = tree();
        let root = t.root();
        let entries = t.read_dir(root, 0).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, ".");
        assert_eq!(entries[1].name, "..");
        assert_eq!(entries[1].inode, root);

        let d = t.resolve_or_create(root, "d", true).unwrap();
        let entries = t.read_dir(d, 1).unwrap();
        assert_eq!(entries[0].name, "..");
        assert_eq!(entries[0].inode, root);
    }

    #[test]
    fn unlink_and_free_bookkeeping() {
        let mut t = tree();
        let root = t.root();
        let a = t
            .alloc(NodeKind::RegularFile, "a", Some(root), Access::default())
            .unwrap();
        assert_eq!(t.live(), 2);

        t.unlink(a);
        assert_eq!(t.orphan_count(), 1);
        assert!(!t.get(a).unwrap().is_linked());
        assert!(t.find_child(root, "a").is_none());

        t.free(a);
        assert_eq!(t.orphan_count(), 0);
        assert_eq!(t.live(), 1);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut t = tree();
        let root = t.root();
        let a = t
            .alloc(NodeKind::RegularFile, "a", Some(root), Access::default())
            .unwrap();
        t.unlink(a);
        t.free(a);
        t.free(a);
    }

    #[test]
    #[should_panic(expected = "freeing linked node")]
    fn free_linked_panics() {
        let mut t = tree();
        let root = t.root();
        let a = t
            .alloc(NodeKind::RegularFile, "a", Some(root), Access::default())
            .unwrap();
        t.free(a);
    }

    #[test]
    fn lookup_follows_links() {
        let mut t = tree();
        let dev = device("dsk/da0");
        let leaf = t.create_device_node(&dev).unwrap();
        let link = t.create_link("disk", leaf, NodeFlags::empty()).unwrap();

        assert_eq!(t.lookup("disk", true, 8).unwrap(), leaf);
        assert_eq!(t.lookup("disk", false, 8).unwrap(), link);
        assert_eq!(t.lookup("/dsk/../disk", true, 8).unwrap(), leaf);
        assert_eq!(t.get(leaf).unwrap().nlinks, 1);
        assert_eq!(t.read_link(link).unwrap(), "dsk/da0");
    }

    #[test]
    fn read_link_from_subdirectory() {
        let mut t = tree();
        let leaf = t.create_device_node(&device("a/dev")).unwrap();
        let link = t.create_link("b/link", leaf, NodeFlags::empty()).unwrap();
        assert_eq!(t.read_link(link).unwrap(), "../a/dev");
        assert_eq!(t.lookup("b/link", true, 8).unwrap(), leaf);
    }

    #[test]
    fn lookup_hop_limit() {
        let mut t = tree();
        t.make_symlink("x", "y").unwrap();
        t.make_symlink("y", "x").unwrap();
        assert!(matches!(t.lookup("x", true, 8), Err(DevfsError::TooManyLinks { .. })));
    }

    #[test]
    fn hidden_nodes() {
        let mut t = tree();
        let leaf = t.create_device_node(&device("secret")).unwrap();
        t.create_link("alias", leaf, NodeFlags::empty()).unwrap();
        t.get_mut(leaf).unwrap().flags.insert(NodeFlags::HIDDEN);

        assert!(t.lookup("secret", true, 8).is_err());
        assert!(t.lookup("alias", true, 8).is_err());
        assert!(real_names(&t, t.root()).is_empty());
    }

    #[test]
    fn invisible_nodes_resolve() {
        let mut t = tree();
        let leaf = t.create_device_node(&device("ptyp0")).unwrap();
        t.get_mut(leaf).unwrap().flags.insert(NodeFlags::INVISIBLE);
        assert_eq!(t.lookup("ptyp0", true, 8).unwrap(), leaf);
        assert!(real_names(&t, t.root()).is_empty());
    }

    #[test]
    fn user_operations() {
        let mut t = tree();
        t.make_dir("mine", Access::default()).unwrap();
        t.make_symlink("mine/link", "/mine").unwrap();
        assert!(matches!(
            t.make_dir("mine", Access::default()),
            Err(DevfsError::AlreadyExists { .. })
        ));
        assert!(matches!(
            t.make_dir("nope/x", Access::default()),
            Err(DevfsError::NotFound { .. })
        ));

        assert!(matches!(
            t.remove_user_node("mine", true),
            Err(DevfsError::DirectoryNotEmpty { .. })
        ));
        assert!(matches!(
            t.remove_user_node("mine", false),
            Err(DevfsError::IsADirectory { .. })
        ));
        t.remove_user_node("mine/link", false).unwrap();
        t.remove_user_node("mine", true).unwrap();
        assert_eq!(t.live(), 1);
    }

    #[test]
    fn user_cannot_remove_device_leaf() {
        let mut t = tree();
        t.create_device_node(&device("null")).unwrap();
        assert!(matches!(
            t.remove_user_node("null", false),
            Err(DevfsError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn reap_all_counts_orphans() {
        let mut t = tree();
        t.create_device_node(&device("a/b")).unwrap();
        let stray = t
            .alloc(NodeKind::RegularFile, "stray", Some(t.root()), Access::default())
            .unwrap();
        t.unlink(stray);

        assert_eq!(t.reap_all(), 1);
        assert_eq!(t.live(), 0);
        assert_eq!(t.orphan_count(), 0);
    }

    #[test]
    fn fresh_nodes_are_reported_once() {
        let mut t = tree();
        t.take_fresh();
        t.create_device_node(&device("x/y")).unwrap();
        assert_eq!(t.take_fresh().len(), 2);
        assert!(t.take_fresh().is_empty());
    }
}
