//! # Identity Allocators
//!
//! Two independent allocators live here, neither of them behind the master
//! lock:
//!
//! | Allocator | Hands out | Lock |
//! |-----------|-----------|------|
//! | [`InoAllocator`] | node identities, one per node creation | its own counter lock |
//! | [`ImplTable`] | implementation units, one per live driver implementation | its own table lock |
//!
//! Implementation units are small integers taken from an [`IdAllocator`];
//! running out is reported as [`DevfsError::ResourceExhausted`] instead of
//! silently reusing a unit.

use std::collections::HashMap;

use log::warn;
use parking_lot::Mutex;

use crate::{DevfsError, ImplId, NodeId};

/// Strategy trait for small-integer id allocation.
pub trait IdAllocator: Send {
    /// Reserve the lowest free id, or `None` when every id is taken.
    fn alloc(&mut self) -> Option<u32>;

    /// Return an id to the pool. Releasing a free id is a no-op.
    fn release(&mut self, id: u32);

    /// Number of ids currently reserved.
    fn in_use(&self) -> usize;
}

/// Bit-set allocator over `0..limit`.
#[derive(Debug, Clone)]
pub struct BitmapIdAllocator {
    words: Vec<u64>,
    limit: u32,
    used: usize,
}

impl BitmapIdAllocator {
    /// Allocator for ids `0..limit`.
    pub fn new(limit: u32) -> Self {
        let words = (limit as usize).div_ceil(64);
        Self {
            words: vec![0; words],
            limit,
            used: 0,
        }
    }

    /// Exclusive upper bound of handed-out ids.
    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn is_set(&self, id: u32) -> bool {
        let (w, b) = (id as usize / 64, id % 64);
        self.words.get(w).is_some_and(|word| word & (1 << b) != 0)
    }
}

impl IdAllocator for BitmapIdAllocator {
    fn alloc(&mut self) -> Option<u32> {
        for (w, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = word.trailing_ones();
            let id = w as u32 * 64 + bit;
            if id >= self.limit {
                return None;
            }
            *word |= 1 << bit;
            self.used += 1;
            return Some(id);
        }
        None
    }

    fn release(&mut self, id: u32) {
        if id >= self.limit || !self.is_set(id) {
            return;
        }
        self.words[id as usize / 64] &= !(1 << (id % 64));
        self.used -= 1;
    }

    fn in_use(&self) -> usize {
        self.used
    }
}

#[derive(Debug, Clone, Copy)]
struct ImplUnit {
    unit: u32,
    refs: usize,
}

/// Reference-counted map from driver implementation to its unit number.
pub(crate) struct ImplTable {
    units: HashMap<ImplId, ImplUnit>,
    ids: Box<dyn IdAllocator>,
}

impl ImplTable {
    pub(crate) fn new(ids: Box<dyn IdAllocator>) -> Self {
        Self {
            units: HashMap::new(),
            ids,
        }
    }

    /// Take a reference on `imp`, reserving a unit on first use.
    pub(crate) fn reference(&mut self, imp: ImplId) -> Result<u32, DevfsError> {
        if let Some(entry) = self.units.get_mut(&imp) {
            entry.refs += 1;
            return Ok(entry.unit);
        }
        let Some(unit) = self.ids.alloc() else {
            warn!("implementation {:?}: ran out of unique unit ids", imp);
            return Err(DevfsError::ResourceExhausted {
                resource: "implementation units",
            });
        };
        self.units.insert(imp, ImplUnit { unit, refs: 1 });
        Ok(unit)
    }

    /// Drop a reference; the unit returns to the pool with the last one.
    pub(crate) fn release(&mut self, imp: ImplId) {
        let Some(entry) = self.units.get_mut(&imp) else {
            warn!("implementation {:?}: release without reference", imp);
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            let unit = entry.unit;
            self.units.remove(&imp);
            self.ids.release(unit);
        }
    }

    #[cfg(test)]
    pub(crate) fn unit_of(&self, imp: ImplId) -> Option<u32> {
        self.units.get(&imp).map(|e| e.unit)
    }

    #[cfg(test)]
    pub(crate) fn live_units(&self) -> usize {
        self.ids.in_use()
    }
}

/// Node-identity counter behind its own lock.
///
/// Taken on every node creation in every view, far more often than the
/// master lock is needed for anything else.
#[derive(Debug)]
pub(crate) struct InoAllocator {
    next: Mutex<u64>,
}

impl InoAllocator {
    pub(crate) fn new(first: u64) -> Self {
        Self {
            next: Mutex::new(first),
        }
    }

    pub(crate) fn fetch(&self) -> Result<NodeId, DevfsError> {
        let mut next = self.next.lock();
        let ino = *next;
        *next = ino.checked_add(1).ok_or(DevfsError::ResourceExhausted {
            resource: "node identities",
        })?;
        Ok(NodeId(ino))
    }
}
