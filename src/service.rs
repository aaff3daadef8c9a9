//! # Devfs Service
//!
//! [`Devfs`] owns the whole namespace: the device and alias registries, one
//! tree per mount view, and the core actor thread that is the only context
//! allowed to mutate them.
//!
//! ## Threads and locks
//!
//! | Path | Runs on | Holds |
//! |------|---------|-------|
//! | Mutations (register, aliases, mounts, user ops) | core actor | master lock, state borrowed mutably |
//! | Rule engine and clone handler callbacks | core actor | master lock, state released |
//! | Lookups (`lookup`, `read_dir`, `read_link`) | caller | master lock, state borrowed shared |
//! | Materialization | caller | master lock, dropped around blocking calls |
//!
//! The master lock is reentrant, so a callback running on the actor may
//! submit further requests. Those run inline instead of being queued,
//! which would deadlock the actor on itself.
//!
//! ## Submission modes
//!
//! - **Fire-and-forget**: `register_device`, `unregister_device`,
//!   `make_alias`, `destroy_alias`, `apply_rules`, `reset_rules`. The caller
//!   never blocks and never sees an error; failures are logged.
//! - **Synchronous**: everything else. The caller blocks on a private
//!   one-shot reply channel. Requests from one thread are handled in
//!   submission order, so [`Devfs::drain`] is a barrier for everything that
//!   thread queued before it.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, ReentrantMutex};

use crate::clone::CloneHandler;
use crate::ids::{BitmapIdAllocator, IdAllocator, ImplTable, InoAllocator};
use crate::mount::{MountSelector, MountSpec, MountStats};
use crate::request::{Command, Reply};
use crate::rules::{RuleEngine, RulePass};
use crate::vnode::{Vnode, materialize};
use crate::workers::CoreState;
use crate::{
    Access, DevfsConfig, DevfsError, DeviceFlags, DeviceHandle, DeviceId, DeviceSpec, DirEntry,
    ImplId, MinorSelector, MountId, NodeId, NodeInfo,
};

/// Lifecycle of the core actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Thread spawned, not yet accepting requests.
    Starting,
    /// Accepting and processing requests.
    Running,
    /// Terminate received; later requests are dropped.
    Stopping,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Phase::Starting,
            1 => Phase::Running,
            _ => Phase::Stopping,
        }
    }
}

/// Reply to send once the state is released and detached objects notified.
type Deferred = Box<dyn FnOnce()>;

fn answer<T: 'static>(reply: Reply<T>, value: T) -> Option<Deferred> {
    Some(Box::new(move || {
        // The requester may have given up waiting; nothing to do then.
        let _ = reply.send(value);
    }))
}

/// Run `f` with the state borrowed mutably; the borrow ends on return.
fn with<T>(cell: &RefCell<CoreState>, f: impl FnOnce(&mut CoreState) -> T) -> T {
    f(&mut cell.borrow_mut())
}

// ============================================================================
// Shared state
// ============================================================================

struct Shared {
    config: DevfsConfig,
    state: ReentrantMutex<RefCell<CoreState>>,
    units: Arc<Mutex<ImplTable>>,
    rules: Arc<dyn RuleEngine>,
    phase: AtomicU8,
    actor: OnceLock<ThreadId>,
    /// Nesting level of `execute` on the actor thread.
    depth: AtomicUsize,
}

impl Shared {
    fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn on_actor(&self) -> bool {
        self.actor.get() == Some(&thread::current().id())
    }
}

/// Execute one command under the master lock.
fn execute(shared: &Shared, cmd: Command) {
    assert!(
        shared.on_actor(),
        "{} executed off the core actor thread",
        cmd.kind()
    );
    debug!("dispatch {}", cmd.kind());

    let guard = shared.state.lock();
    let outermost = shared.depth.fetch_add(1, Ordering::Relaxed) == 0;
    let deferred = dispatch(shared, &guard, cmd);
    run_rules(shared, &guard);
    // Nested executions leave detached objects for the outermost one, which
    // is the only level that really releases the lock.
    let detached = if outermost {
        with(&guard, CoreState::take_detached)
    } else {
        Vec::new()
    };
    shared.depth.fetch_sub(1, Ordering::Relaxed);
    drop(guard);

    for vnode in detached {
        vnode.detach();
    }
    if let Some(reply) = deferred {
        reply();
    }
}

fn dispatch(shared: &Shared, cell: &RefCell<CoreState>, cmd: Command) -> Option<Deferred> {
    match cmd {
        Command::Register { device, access } => {
            if let Err(err) = with(cell, |st| st.register(device, access)) {
                debug!("register: {err}");
            }
            None
        }
        Command::Unregister { device } => {
            let _ = with(cell, |st| st.unregister(&device));
            None
        }
        Command::MakeAlias { name, target } => {
            let _ = with(cell, |st| st.make_alias(&name, &target));
            None
        }
        Command::DestroyAlias { pattern, target } => {
            let _ = with(cell, |st| st.destroy_alias(&pattern, &target));
            None
        }
        Command::ApplyRules { selector } => {
            with(cell, |st| st.queue_rules(&selector, RulePass::Apply));
            None
        }
        Command::ResetRules { selector } => {
            with(cell, |st| st.queue_rules(&selector, RulePass::Reset));
            None
        }

        Command::DestroyDescendants { device, reply } => {
            with(cell, |st| st.destroy_descendants(&device));
            answer(reply, ())
        }
        Command::DestroyMatching { owner, minor, reply } => {
            answer(reply, with(cell, |st| st.destroy_matching(owner, minor)))
        }
        Command::ClearFlagOnDescendants { device, flag, reply } => {
            with(cell, |st| st.clear_flag_on_descendants(&device, flag));
            answer(reply, ())
        }
        Command::DestroyDescendantsWithoutFlag { device, flag, reply } => {
            with(cell, |st| st.destroy_descendants_without_flag(&device, flag));
            answer(reply, ())
        }
        Command::AddMount { spec, reply } => answer(reply, with(cell, |st| st.add_mount(spec))),
        Command::RemoveMount { mount, reply } => {
            answer(reply, with(cell, |st| st.remove_mount(mount)))
        }
        Command::AddCloneHandler { name, handler, reply } => {
            answer(reply, with(cell, |st| st.add_clone_handler(&name, handler)))
        }
        Command::RemoveCloneHandler { name, reply } => {
            answer(reply, with(cell, |st| st.remove_clone_handler(&name)))
        }
        Command::OpenClone { mount, name, reply } => answer(reply, open_clone(cell, mount, &name)),
        Command::FindByName { name, reply } => {
            answer(reply, with(cell, |st| st.find_by_name(&name)))
        }
        Command::FindByIdentity { id, reply } => {
            answer(reply, with(cell, |st| st.find_by_identity(id)))
        }
        Command::Scan { reply } => answer(reply, with(cell, |st| st.scan())),
        Command::CheckInode { mount, inode, reply } => {
            answer(reply, with(cell, |st| st.check_inode(mount, inode)))
        }
        Command::MakeDir {
            mount,
            path,
            access,
            reply,
        } => answer(reply, with(cell, |st| st.make_dir(mount, &path, access))),
        Command::MakeSymlink {
            mount,
            path,
            target,
            reply,
        } => answer(reply, with(cell, |st| st.make_symlink(mount, &path, &target))),
        Command::Remove {
            mount,
            path,
            dir,
            reply,
        } => answer(reply, with(cell, |st| st.remove(mount, &path, dir))),
        Command::Reclaim { mount, inode, reply } => {
            with(cell, |st| st.reclaim(mount, inode));
            answer(reply, ())
        }
        Command::Sync { reply } => answer(reply, ()),
        Command::Terminate { reply } => {
            shared.set_phase(Phase::Stopping);
            let leaked = with(cell, CoreState::shutdown);
            if leaked > 0 {
                warn!("shutdown reaped {leaked} leaked nodes");
            }
            answer(reply, ())
        }
    }
}

/// Look up the handler, call it with the state released, then place its
/// device in `mount`.
fn open_clone(
    cell: &RefCell<CoreState>,
    mount: MountId,
    name: &str,
) -> Result<NodeInfo, DevfsError> {
    let handler = with(cell, |st| {
        st.view(mount)?;
        st.clones.find(name).ok_or_else(|| DevfsError::not_found(name))
    })?;
    let device = handler
        .clone_device(name)
        .ok_or_else(|| DevfsError::not_found(name))?;
    with(cell, |st| st.finish_clone(mount, &device))
}

/// Offer queued nodes to the rule engine until nothing new appears.
fn run_rules(shared: &Shared, cell: &RefCell<CoreState>) {
    while let Some((job, mut target)) = with(cell, CoreState::next_rule_job) {
        trace!("rules: {:?} {}", job.pass, target.info().name);
        match job.pass {
            RulePass::Apply => shared.rules.apply(&mut target),
            RulePass::Reset => shared.rules.reset(&mut target),
        }
        with(cell, |st| st.commit_rule(job, target));
    }
}

fn run_actor(shared: Arc<Shared>, rx: Receiver<Command>, ready: Sender<()>) {
    let _ = shared.actor.set(thread::current().id());
    shared.set_phase(Phase::Running);
    let _ = ready.send(());
    info!("core actor running");

    while let Ok(cmd) = rx.recv() {
        let last = matches!(cmd, Command::Terminate { .. });
        execute(&shared, cmd);
        if last {
            break;
        }
    }
    shared.set_phase(Phase::Stopping);
    info!("core actor stopped");
}

// ============================================================================
// Devfs
// ============================================================================

struct Inner {
    shared: Arc<Shared>,
    tx: Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn stop(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        let (reply, done) = bounded(1);
        let sent = self.tx.send(Command::Terminate { reply }).is_ok();
        if handle.thread().id() == thread::current().id() {
            // Stopped from a callback: the queued terminate ends the loop
            // once the current request returns.
            return;
        }
        if sent {
            let _ = done.recv();
        }
        if handle.join().is_err() {
            error!("core actor panicked");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle to a running devfs namespace service.
///
/// Cheap to clone; every clone talks to the same core actor. The actor
/// stops on [`shutdown`](Devfs::shutdown) or when the last clone is dropped.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use devfs_core::{
///     Access, Devfs, DevfsConfig, DevfsError, DeviceSpec, ImplId, MountId, MountSpec, NoRules,
///     NodeInfo, Vnode, VnodeAllocator,
/// };
///
/// struct Plain;
/// impl Vnode for Plain {
///     fn acquire(&self) -> Result<(), DevfsError> { Ok(()) }
///     fn detach(&self) {}
/// }
///
/// struct Alloc;
/// impl VnodeAllocator for Alloc {
///     fn allocate(&self, _node: &NodeInfo) -> Result<Arc<dyn Vnode>, DevfsError> {
///         Ok(Arc::new(Plain))
///     }
/// }
///
/// let devfs = Devfs::start(DevfsConfig::default(), Arc::new(NoRules))?;
/// let null = devfs.new_device(DeviceSpec::new("null", ImplId(1), 2))?;
/// devfs.register_device(&null, Access::new(0, 0, 0o666));
///
/// devfs.add_mount(MountSpec::new(MountId(1), "/dev", Arc::new(Alloc)))?;
/// let node = devfs.lookup(MountId(1), "null")?;
/// assert_eq!(node.access.mode, 0o666);
///
/// devfs.shutdown();
/// # Ok::<(), DevfsError>(())
/// ```
#[derive(Clone)]
pub struct Devfs {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Devfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Devfs")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Devfs {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the core actor and wait until it accepts requests.
    ///
    /// Implementation units are drawn from a [`BitmapIdAllocator`] sized by
    /// [`DevfsConfig::max_impl_units`].
    pub fn start(config: DevfsConfig, rules: Arc<dyn RuleEngine>) -> Result<Self, DevfsError> {
        let ids = BitmapIdAllocator::new(config.max_impl_units);
        Self::start_with_ids(config, rules, Box::new(ids))
    }

    /// Like [`start`](Devfs::start) with a caller-provided unit allocator.
    pub fn start_with_ids(
        config: DevfsConfig,
        rules: Arc<dyn RuleEngine>,
        ids: Box<dyn IdAllocator>,
    ) -> Result<Self, DevfsError> {
        let inos = Arc::new(InoAllocator::new(config.first_inode));
        let shared = Arc::new(Shared {
            state: ReentrantMutex::new(RefCell::new(CoreState::new(config.clone(), inos))),
            units: Arc::new(Mutex::new(ImplTable::new(ids))),
            rules,
            phase: AtomicU8::new(Phase::Starting as u8),
            actor: OnceLock::new(),
            depth: AtomicUsize::new(0),
            config,
        });

        let (tx, rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let actor_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(shared.config.thread_name.clone())
            .spawn(move || run_actor(actor_shared, rx, ready_tx))
            .map_err(|err| DevfsError::Backend(format!("cannot spawn core actor: {err}")))?;

        if ready_rx.recv().is_err() {
            let _ = handle.join();
            return Err(DevfsError::Stopped);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                tx,
                thread: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Stop the core actor after every earlier request has been handled.
    ///
    /// All mount views are torn down. Later submissions are dropped and
    /// synchronous calls report [`DevfsError::Stopped`].
    pub fn shutdown(&self) {
        self.inner.stop();
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.shared().phase()
    }

    /// Wait until every request this thread submitted earlier is applied.
    pub fn drain(&self) -> Result<(), DevfsError> {
        self.call(|reply| Command::Sync { reply })
    }

    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    /// Hand `cmd` to the actor, or run it inline when already on it.
    fn submit(&self, cmd: Command) -> Result<(), Command> {
        let shared = self.shared();
        if shared.phase() != Phase::Running {
            return Err(cmd);
        }
        if shared.on_actor() {
            execute(shared, cmd);
            return Ok(());
        }
        self.inner.tx.send(cmd).map_err(|err| err.into_inner())
    }

    fn post(&self, cmd: Command) {
        if let Err(cmd) = self.submit(cmd) {
            warn!("{} dropped: service is not running", cmd.kind());
        }
    }

    fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, DevfsError> {
        let (reply, rx) = bounded(1);
        if let Err(cmd) = self.submit(make(reply)) {
            debug!("{} refused: service is not running", cmd.kind());
            return Err(DevfsError::Stopped);
        }
        rx.recv().map_err(|_| DevfsError::Stopped)
    }

    fn read<T>(&self, f: impl FnOnce(&CoreState) -> T) -> T {
        let guard = self.shared().state.lock();
        let state = guard.borrow();
        f(&state)
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Build a device handle, reserving an implementation unit for its
    /// owner (or backing implementation) if it has none yet.
    pub fn new_device(&self, spec: DeviceSpec) -> Result<DeviceHandle, DevfsError> {
        let shared = self.shared();
        DeviceHandle::create(spec, &shared.units, shared.config.default_access)
            .inspect_err(|err| warn!("new_device: {err}"))
    }

    /// Register a device in every mount view. Fire-and-forget; registering
    /// the same handle twice is a logged no-op.
    pub fn register_device(&self, device: &DeviceHandle, access: Access) {
        self.post(Command::Register {
            device: device.clone(),
            access,
        });
    }

    /// Unregister a device and everything derived from it. Fire-and-forget
    /// and idempotent.
    pub fn unregister_device(&self, device: &DeviceHandle) {
        self.post(Command::Unregister {
            device: device.clone(),
        });
    }

    /// Unregister every device derived, directly or not, from `device`.
    pub fn destroy_descendants(&self, device: &DeviceHandle) -> Result<(), DevfsError> {
        let device = device.clone();
        self.call(|reply| Command::DestroyDescendants { device, reply })
    }

    /// Unregister every device of `owner` whose minor matches. Returns how
    /// many were removed.
    pub fn destroy_matching(
        &self,
        owner: ImplId,
        minor: MinorSelector,
    ) -> Result<usize, DevfsError> {
        self.call(|reply| Command::DestroyMatching { owner, minor, reply })
    }

    /// Clear `flag` on every descendant of `device`.
    pub fn clear_flag_on_descendants(
        &self,
        device: &DeviceHandle,
        flag: DeviceFlags,
    ) -> Result<(), DevfsError> {
        let device = device.clone();
        self.call(|reply| Command::ClearFlagOnDescendants { device, flag, reply })
    }

    /// Unregister every descendant of `device` that lacks `flag`.
    pub fn destroy_descendants_without_flag(
        &self,
        device: &DeviceHandle,
        flag: DeviceFlags,
    ) -> Result<(), DevfsError> {
        let device = device.clone();
        self.call(|reply| Command::DestroyDescendantsWithoutFlag { device, flag, reply })
    }

    /// Registered device (or alias target) called exactly `name`.
    pub fn find_by_name(&self, name: &str) -> Option<DeviceHandle> {
        let name = name.to_string();
        self.call(|reply| Command::FindByName { name, reply }).ok().flatten()
    }

    /// Registered device with identity `id`.
    pub fn find_by_identity(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.call(|reply| Command::FindByIdentity { id, reply }).ok().flatten()
    }

    /// Call `f` once per registered device, then once per alias
    /// (`is_alias` set). Runs on the calling thread over a snapshot.
    pub fn scan(&self, mut f: impl FnMut(&str, &DeviceHandle, bool)) -> Result<(), DevfsError> {
        let entries = self.call(|reply| Command::Scan { reply })?;
        for (name, device, is_alias) in &entries {
            f(name, device, *is_alias);
        }
        Ok(())
    }

    // ========================================================================
    // Aliases and rules
    // ========================================================================

    /// Record an alias and mirror it as a symbolic link in every view
    /// holding the target. Fire-and-forget.
    pub fn make_alias(&self, name: &str, target: &DeviceHandle) {
        self.post(Command::MakeAlias {
            name: name.to_string(),
            target: target.clone(),
        });
    }

    /// Remove the first alias of `target` matching the `*`/`?` pattern.
    /// Fire-and-forget.
    pub fn destroy_alias(&self, pattern: &str, target: &DeviceHandle) {
        self.post(Command::DestroyAlias {
            pattern: pattern.to_string(),
            target: target.clone(),
        });
    }

    /// Offer every node of the selected views to the rule engine.
    pub fn apply_rules(&self, selector: MountSelector) {
        self.post(Command::ApplyRules { selector });
    }

    /// Undo rule effects on every node of the selected views.
    pub fn reset_rules(&self, selector: MountSelector) {
        self.post(Command::ResetRules { selector });
    }

    // ========================================================================
    // Mounts and clone handlers
    // ========================================================================

    /// Add a view. On return it holds a leaf for every registered device.
    pub fn add_mount(&self, spec: MountSpec) -> Result<(), DevfsError> {
        self.call(|reply| Command::AddMount { spec, reply })?
    }

    /// Tear a view down. Returns how many nodes were reaped as leaks.
    pub fn remove_mount(&self, mount: MountId) -> Result<usize, DevfsError> {
        self.call(|reply| Command::RemoveMount { mount, reply })?
    }

    /// Diagnostic counters of a view.
    pub fn mount_stats(&self, mount: MountId) -> Result<MountStats, DevfsError> {
        self.read(|st| st.mount_stats(mount))
    }

    /// Register a handler that manufactures devices when `name` is opened.
    pub fn add_clone_handler(
        &self,
        name: &str,
        handler: Arc<dyn CloneHandler>,
    ) -> Result<(), DevfsError> {
        let name = name.to_string();
        self.call(|reply| Command::AddCloneHandler { name, handler, reply })?
    }

    /// Remove the handler registered for `name`.
    pub fn remove_clone_handler(&self, name: &str) -> Result<(), DevfsError> {
        let name = name.to_string();
        self.call(|reply| Command::RemoveCloneHandler { name, reply })?
    }

    /// Ask the handler for `name` for a device and return its leaf in
    /// `mount`.
    pub fn open_clone(&self, mount: MountId, name: &str) -> Result<NodeInfo, DevfsError> {
        let name = name.to_string();
        self.call(|reply| Command::OpenClone { mount, name, reply })?
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Resolve a mount-relative path, following symbolic links.
    pub fn lookup(&self, mount: MountId, path: &str) -> Result<NodeInfo, DevfsError> {
        let depth = self.shared().config.max_link_depth;
        self.read(|st| {
            let view = st.view(mount)?;
            view.info(view.tree.lookup(path, true, depth)?)
        })
    }

    /// Snapshot of the node `inode` of `mount`.
    pub fn node_info(&self, mount: MountId, inode: NodeId) -> Result<NodeInfo, DevfsError> {
        self.read(|st| st.view(mount)?.info(inode))
    }

    /// Entries of the directory at `path` whose cookie is at least
    /// `from_cookie`. Cookie 0 restarts from the beginning.
    pub fn read_dir(
        &self,
        mount: MountId,
        path: &str,
        from_cookie: u64,
    ) -> Result<Vec<DirEntry>, DevfsError> {
        let depth = self.shared().config.max_link_depth;
        self.read(|st| {
            let tree = &st.view(mount)?.tree;
            tree.read_dir(tree.lookup(path, true, depth)?, from_cookie)
        })
    }

    /// Target of the symbolic link at `path`.
    pub fn read_link(&self, mount: MountId, path: &str) -> Result<String, DevfsError> {
        let depth = self.shared().config.max_link_depth;
        self.read(|st| {
            let tree = &st.view(mount)?.tree;
            tree.read_link(tree.lookup(path, false, depth)?)
        })
    }

    /// Bind (or reuse) the external object of a node. May block on the
    /// object's own lock or on allocation, never with the state locked.
    pub fn materialize(&self, mount: MountId, inode: NodeId) -> Result<Arc<dyn Vnode>, DevfsError> {
        materialize(&self.shared().state, mount, inode)
    }

    /// [`lookup`](Devfs::lookup) followed by [`materialize`](Devfs::materialize).
    pub fn vnode_for_path(&self, mount: MountId, path: &str) -> Result<Arc<dyn Vnode>, DevfsError> {
        let node = self.lookup(mount, path)?;
        self.materialize(mount, node.inode)
    }

    /// External object for a live node, after the actor has confirmed the
    /// node exists.
    pub fn node_for_inode(&self, mount: MountId, inode: NodeId) -> Option<Arc<dyn Vnode>> {
        let live = self.call(|reply| Command::CheckInode { mount, inode, reply }).ok()?;
        if !live {
            return None;
        }
        self.materialize(mount, inode)
            .inspect_err(|err| debug!("node_for_inode {mount}/{inode}: {err}"))
            .ok()
    }

    // ========================================================================
    // User operations
    // ========================================================================

    /// Create a directory. User directories are never garbage-collected.
    pub fn make_dir(
        &self,
        mount: MountId,
        path: &str,
        access: Access,
    ) -> Result<NodeInfo, DevfsError> {
        let path = path.to_string();
        self.call(|reply| Command::MakeDir {
            mount,
            path,
            access,
            reply,
        })?
    }

    /// Create a symbolic link holding `target` as text.
    pub fn make_symlink(
        &self,
        mount: MountId,
        path: &str,
        target: &str,
    ) -> Result<NodeInfo, DevfsError> {
        let path = path.to_string();
        let target = target.to_string();
        self.call(|reply| Command::MakeSymlink {
            mount,
            path,
            target,
            reply,
        })?
    }

    /// Remove an empty user-created directory.
    pub fn remove_dir(&self, mount: MountId, path: &str) -> Result<(), DevfsError> {
        self.remove_user(mount, path, true)
    }

    /// Remove a user-created non-directory node.
    pub fn remove(&self, mount: MountId, path: &str) -> Result<(), DevfsError> {
        self.remove_user(mount, path, false)
    }

    fn remove_user(&self, mount: MountId, path: &str, dir: bool) -> Result<(), DevfsError> {
        let path = path.to_string();
        self.call(|reply| Command::Remove {
            mount,
            path,
            dir,
            reply,
        })?
    }

    /// The external object of `inode` is being destroyed. A node that is
    /// no longer linked is freed.
    pub fn reclaim(&self, mount: MountId, inode: NodeId) -> Result<(), DevfsError> {
        self.call(|reply| Command::Reclaim { mount, inode, reply })
    }
}
