//! # devfs-core
//!
//! A concurrent **device namespace service**: it mirrors a live set of
//! device handles into any number of mounted directory trees, keeps named
//! aliases in sync across every view, and hands out lazily bound per-node
//! objects to the filesystem layer that serves the mounts.
//!
//! ---
//!
//! ## Quick Start
//!
//! Drivers register and unregister devices; mounts come and go; lookups
//! happen on whatever thread the filesystem layer uses.
//!
//! ```rust
//! use std::sync::Arc;
//! use devfs_core::{
//!     Access, Devfs, DevfsConfig, DevfsError, DeviceSpec, ImplId, MountId, MountSpec, NoRules,
//!     NodeInfo, NodeKind, Vnode, VnodeAllocator,
//! };
//!
//! struct Plain;
//! impl Vnode for Plain {
//!     fn acquire(&self) -> Result<(), DevfsError> { Ok(()) }
//!     fn detach(&self) {}
//! }
//!
//! struct Alloc;
//! impl VnodeAllocator for Alloc {
//!     fn allocate(&self, _node: &NodeInfo) -> Result<Arc<dyn Vnode>, DevfsError> {
//!         Ok(Arc::new(Plain))
//!     }
//! }
//!
//! let devfs = Devfs::start(DevfsConfig::default(), Arc::new(NoRules))?;
//!
//! // A handle named "usb/ugen0" lands in directory "usb".
//! let ugen = devfs.new_device(DeviceSpec::new("usb/ugen0", ImplId(7), 0))?;
//! devfs.register_device(&ugen, Access::new(0, 0, 0o660));
//! devfs.make_alias("ugen", &ugen);
//!
//! let dev = MountId(1);
//! devfs.add_mount(MountSpec::new(dev, "/dev", Arc::new(Alloc)))?;
//! assert_eq!(devfs.lookup(dev, "usb")?.kind, NodeKind::Directory);
//! assert_eq!(devfs.read_link(dev, "ugen")?, "usb/ugen0");
//!
//! // Unregistering removes the leaf, its alias and the emptied directory.
//! devfs.unregister_device(&ugen);
//! devfs.drain()?;
//! assert!(devfs.lookup(dev, "usb").is_err());
//! # Ok::<(), DevfsError>(())
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Devfs`] | The service: core actor thread plus the boundary API |
//! | [`DeviceHandle`] | Shared, reference-counted identity of one device instance |
//! | [`DeviceSpec`] | Description of a device to create |
//! | [`MountSpec`] | Description of a mount view and its object allocator |
//! | [`Vnode`] / [`VnodeAllocator`] | External per-node objects owned by the filesystem layer |
//! | [`RuleEngine`] / [`RuleTarget`] | Injected policy tagging new nodes |
//! | [`CloneHandler`] | Devices manufactured on open |
//! | [`DevfsError`] | Error type with context |
//! | [`NodeInfo`] / [`DirEntry`] | Snapshots returned by lookups |
//!
//! ---
//!
//! ## Who Mutates What
//!
//! ```text
//!  driver threads ──register/unregister──┐
//!  mount layer ─────add/remove mount─────┤     ┌──────────────┐
//!  callers ─────────aliases, rules───────┼───▶ │  core actor  │──▶ registries + trees
//!                                        │     └──────────────┘
//!  rule / clone callbacks ──(inline)─────┘            ▲
//!                                                     │ master lock
//!  lookup threads ──lookup, read_dir, materialize─────┘
//! ```
//!
//! Only the core actor mutates. Requests are FIFO, so everything one thread
//! submitted is applied in order; [`Devfs::drain`] waits for it.
//!
//! ---
//!
//! ## Error Handling
//!
//! Fire-and-forget operations never fail the caller; problems are logged
//! through the [`log`] facade. Synchronous operations return
//! `Result<T, DevfsError>`, and lookups by device return `Option`.
//!
//! ```rust
//! use devfs_core::DevfsError;
//!
//! let err = DevfsError::AlreadyRemoved { name: "da0".into() };
//! assert!(err.is_benign());
//! assert_eq!(err.to_string(), "already removed: da0");
//! ```
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Enable serialization for [`DevfsConfig`], [`NodeInfo`], [`DirEntry`], [`Access`], etc. |

// Private modules
mod alias;
mod clone;
mod config;
mod device;
mod error;
mod gc;
mod ids;
mod matcher;
mod mount;
mod node;
mod path;
mod registry;
mod request;
mod rules;
mod service;
mod tree;
mod types;
mod vnode;
mod workers;

// Public re-exports - error types
pub use error::DevfsError;

// Public re-exports - core types
pub use types::{
    Access, DeviceFlags, DeviceId, DirEntry, ImplId, MinorSelector, MountId, NodeFlags, NodeId,
    NodeInfo, NodeKind,
};

// Public re-exports - configuration
pub use config::DevfsConfig;

// Public re-exports - devices
pub use device::{DeviceHandle, DeviceSpec};
pub use ids::{BitmapIdAllocator, IdAllocator};

// Public re-exports - mounts and external objects
pub use mount::{MountSelector, MountSpec, MountStats};
pub use vnode::{Vnode, VnodeAllocator};

// Public re-exports - policy seams
pub use clone::CloneHandler;
pub use rules::{NoRules, RuleEngine, RuleTarget};

// Public re-exports - matching
pub use matcher::{wild_match, wild_match_ignore_case};

// Public re-exports - service
pub use service::{Devfs, Phase};
