//! Device handles.
//!
//! A [`DeviceHandle`] is a shared, reference-counted identity for one device
//! instance. The caller that creates it holds the first reference, the
//! registry takes another while the handle is linked, and namespace nodes
//! and aliases only keep weak back-references. The implementation unit
//! reserved for the handle's driver is returned when the last strong
//! reference is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::ids::ImplTable;
use crate::{Access, DevfsError, DeviceFlags, DeviceId, ImplId};

/// Parameters for [`Devfs::new_device`](crate::Devfs::new_device).
///
/// # Example
///
/// ```rust
/// use devfs_core::{DeviceFlags, DeviceSpec, ImplId};
///
/// let spec = DeviceSpec::new("da0s1", ImplId(4), 1).with_flags(DeviceFlags::PRESENT);
/// assert_eq!(spec.name, "da0s1");
/// ```
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Display name; embedded `/` place the leaf in subdirectories.
    pub name: String,
    /// Driver implementation that owns the device.
    pub owner: ImplId,
    /// Backing implementation of a layered device.
    pub backing: Option<ImplId>,
    /// Minor number.
    pub minor: u32,
    /// Initial driver flags.
    pub flags: DeviceFlags,
    /// Handle this device was derived from.
    pub parent: Option<DeviceHandle>,
}

impl DeviceSpec {
    /// A description with no backing implementation, flags or parent.
    pub fn new(name: impl Into<String>, owner: ImplId, minor: u32) -> Self {
        Self {
            name: name.into(),
            owner,
            backing: None,
            minor,
            flags: DeviceFlags::empty(),
            parent: None,
        }
    }

    /// Mark the device as layered on top of `backing`.
    pub fn with_backing(mut self, backing: ImplId) -> Self {
        self.backing = Some(backing);
        self
    }

    /// Set the initial driver flags.
    pub fn with_flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Record the handle this device was derived from.
    pub fn with_parent(mut self, parent: &DeviceHandle) -> Self {
        self.parent = Some(parent.clone());
        self
    }
}

pub(crate) struct DeviceInner {
    name: String,
    owner: ImplId,
    backing: Option<ImplId>,
    id: DeviceId,
    flags: AtomicU32,
    access: Mutex<Access>,
    parent: Option<WeakDevice>,
    linked: AtomicBool,
    units: Arc<Mutex<ImplTable>>,
}

impl DeviceInner {
    /// Implementation whose unit this device holds a reference on.
    fn unit_impl(&self) -> ImplId {
        self.backing.unwrap_or(self.owner)
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        let imp = self.unit_impl();
        self.units.lock().release(imp);
    }
}

/// Shared handle to one device instance.
///
/// Cloning takes a reference; dropping releases it. Equality is identity,
/// not name.
#[derive(Clone)]
pub struct DeviceHandle {
    inner: Arc<DeviceInner>,
}

impl DeviceHandle {
    pub(crate) fn create(
        spec: DeviceSpec,
        units: &Arc<Mutex<ImplTable>>,
        access: Access,
    ) -> Result<Self, DevfsError> {
        let imp = spec.backing.unwrap_or(spec.owner);
        let unit = units.lock().reference(imp)?;
        Ok(Self {
            inner: Arc::new(DeviceInner {
                name: spec.name,
                owner: spec.owner,
                backing: spec.backing,
                id: DeviceId::new(unit, spec.minor),
                flags: AtomicU32::new(spec.flags.bits()),
                access: Mutex::new(access),
                parent: spec.parent.as_ref().map(DeviceHandle::downgrade),
                linked: AtomicBool::new(false),
                units: Arc::clone(units),
            }),
        })
    }

    /// Display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Raw identity: implementation unit and minor number.
    #[inline]
    pub fn id(&self) -> DeviceId {
        self.inner.id
    }

    /// Minor number.
    #[inline]
    pub fn minor(&self) -> u32 {
        self.inner.id.minor()
    }

    /// Owning implementation.
    #[inline]
    pub fn owner(&self) -> ImplId {
        self.inner.owner
    }

    /// Backing implementation of a layered device.
    #[inline]
    pub fn backing(&self) -> Option<ImplId> {
        self.inner.backing
    }

    /// Current driver flags.
    pub fn flags(&self) -> DeviceFlags {
        DeviceFlags::from_bits_retain(self.inner.flags.load(Ordering::Acquire))
    }

    /// Set driver flags.
    pub fn insert_flags(&self, flags: DeviceFlags) {
        self.inner.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Clear driver flags.
    pub fn remove_flags(&self, flags: DeviceFlags) {
        self.inner.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Access triple assigned at registration.
    pub fn access(&self) -> Access {
        *self.inner.access.lock()
    }

    pub(crate) fn set_access(&self, access: Access) {
        *self.inner.access.lock() = access;
    }

    /// Handle this device was derived from, if it is still alive.
    pub fn parent(&self) -> Option<DeviceHandle> {
        self.inner.parent.as_ref().and_then(WeakDevice::upgrade)
    }

    /// Whether `self` was derived from `parent`.
    pub fn is_child_of(&self, parent: &DeviceHandle) -> bool {
        self.inner.parent.as_ref().is_some_and(|p| p.is(parent))
    }

    /// Whether the handle is currently linked into the registry.
    #[inline]
    pub fn is_registered(&self) -> bool {
        self.inner.linked.load(Ordering::Acquire)
    }

    /// Number of strong references currently held.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Identity comparison.
    #[inline]
    pub fn ptr_eq(&self, other: &DeviceHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakDevice {
        WeakDevice(Arc::downgrade(&self.inner))
    }

    /// Set the linked flag; `false` if it was already set.
    pub(crate) fn mark_linked(&self) -> bool {
        self.inner
            .linked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the linked flag; `false` if it was already clear.
    pub(crate) fn mark_unlinked(&self) -> bool {
        self.inner
            .linked
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for DeviceHandle {}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("flags", &self.flags())
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Non-owning back-reference to a device.
#[derive(Clone)]
pub(crate) struct WeakDevice(Weak<DeviceInner>);

impl WeakDevice {
    pub(crate) fn upgrade(&self) -> Option<DeviceHandle> {
        self.0.upgrade().map(|inner| DeviceHandle { inner })
    }

    /// Whether every owning handle is gone.
    pub(crate) fn is_dropped(&self) -> bool {
        self.0.strong_count() == 0
    }

    /// Identity comparison without upgrading.
    pub(crate) fn is(&self, dev: &DeviceHandle) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&dev.inner))
    }
}

impl fmt::Debug for WeakDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(dev) => write!(f, "WeakDevice({})", dev.name()),
            None => f.write_str("WeakDevice(<dropped>)"),
        }
    }
}
