//! # Vnode Materializer
//!
//! Nodes are bound lazily to an external per-open object (a vnode) owned by
//! the embedding filesystem layer. Both ways of obtaining one can block:
//! locking an existing object waits for other users, and allocating a new
//! one may sleep. Neither may happen while the master lock is held, so
//! materialization is an optimistic loop:
//!
//! ```text
//!            ┌──────────── lock ◀──────────────────────────┐
//!            ▼                                              │
//!     bound? ──yes──▶ hold, unlock, acquire ──Busy──────────┤
//!       │                      │ ok                         │
//!       │                      ▼                            │
//!       │                    done                           │
//!       no                                                  │
//!       ▼                                                   │
//!     unlock, allocate, lock ──install lost──▶ discard ─────┘
//!                   │ installed
//!                   ▼
//!                 done
//! ```
//!
//! Only one allocation can ever be installed in a node's slot; the losers
//! of a race are handed back to their allocator.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;

use log::trace;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::workers::CoreState;
use crate::{DevfsError, MountId, NodeId, NodeInfo};

/// External per-open object bound to a namespace node.
pub trait Vnode: Send + Sync {
    /// Take exclusive use of the object.
    ///
    /// Returns [`DevfsError::Busy`] while the object is being torn down;
    /// the materializer then retries until the node is rebound or gone.
    fn acquire(&self) -> Result<(), DevfsError>;

    /// The node behind the object was freed; drop the back-reference.
    ///
    /// Called without the master lock held.
    fn detach(&self);
}

/// Factory for a mount view's external objects.
pub trait VnodeAllocator: Send + Sync {
    /// Create an object for `node`. Called without the master lock held.
    fn allocate(&self, node: &NodeInfo) -> Result<Arc<dyn Vnode>, DevfsError>;

    /// Take back an object that lost the race to be bound.
    fn discard(&self, vnode: Arc<dyn Vnode>) {
        drop(vnode);
    }
}

/// Bind (or reuse) the external object of `inode` in `mount`.
pub(crate) fn materialize(
    state: &ReentrantMutex<RefCell<CoreState>>,
    mount: MountId,
    inode: NodeId,
) -> Result<Arc<dyn Vnode>, DevfsError> {
    let mut guard = state.lock();
    loop {
        let (bound, allocator, info) = {
            let st = guard.borrow();
            let view = st.view(mount)?;
            let node = view
                .tree
                .get(inode)
                .ok_or(DevfsError::InodeNotFound { inode })?;
            (node.vnode.get(), Arc::clone(&view.spec.allocator), node.info(mount))
        };

        if let Some(held) = bound {
            match ReentrantMutexGuard::unlocked(&mut guard, || held.acquire()) {
                Ok(()) => return Ok(held),
                Err(DevfsError::Busy) => {
                    trace!("{mount}: vnode of {inode} busy, retrying");
                    drop(held);
                    ReentrantMutexGuard::unlocked(&mut guard, thread::yield_now);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        let fresh = ReentrantMutexGuard::unlocked(&mut guard, || allocator.allocate(&info))?;
        let installed = {
            let mut st = guard.borrow_mut();
            match st.view_mut(mount).ok().and_then(|v| v.tree.get_mut(inode)) {
                Some(node) => node.vnode.try_install(fresh),
                None => Err(fresh),
            }
        };
        match installed {
            Ok(vnode) => return Ok(vnode),
            Err(lost) => {
                trace!("{mount}: lost vnode race on {inode}");
                ReentrantMutexGuard::unlocked(&mut guard, || allocator.discard(lost));
            }
        }
    }
}
