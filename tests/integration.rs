//! Integration tests driving the public `Devfs` API end to end.
//!
//! These tests verify that:
//! 1. Registration, aliases and unregistration propagate to every view
//! 2. Mount add/remove are barriers with full synchronization and teardown
//! 3. Rule engines and clone handlers can re-enter the service
//! 4. The materializer binds exactly one external object per node
//! 5. Shutdown is orderly and later requests are refused

use devfs_core::*;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

// =============================================================================
// Mock external objects
// =============================================================================

struct MockVnode {
    name: String,
    busy_left: AtomicUsize,
    detached: AtomicBool,
}

impl Vnode for MockVnode {
    fn acquire(&self) -> Result<(), DevfsError> {
        let left = self.busy_left.load(Ordering::SeqCst);
        if left > 0 {
            self.busy_left.store(left - 1, Ordering::SeqCst);
            return Err(DevfsError::Busy);
        }
        Ok(())
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

/// Allocator remembering every object it hands out.
#[derive(Default)]
struct MockAllocator {
    created: Mutex<Vec<Arc<MockVnode>>>,
    discarded: AtomicUsize,
    busy: usize,
    delay: Option<Duration>,
}

impl MockAllocator {
    fn allocations(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    fn created_for(&self, name: &str) -> Vec<Arc<MockVnode>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.name == name)
            .cloned()
            .collect()
    }
}

impl VnodeAllocator for MockAllocator {
    fn allocate(&self, node: &NodeInfo) -> Result<Arc<dyn Vnode>, DevfsError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let vnode = Arc::new(MockVnode {
            name: node.name.clone(),
            busy_left: AtomicUsize::new(self.busy),
            detached: AtomicBool::new(false),
        });
        self.created.lock().unwrap().push(Arc::clone(&vnode));
        Ok(vnode)
    }

    fn discard(&self, vnode: Arc<dyn Vnode>) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
        drop(vnode);
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn start() -> Devfs {
    start_with(Arc::new(NoRules))
}

fn start_with(rules: Arc<dyn RuleEngine>) -> Devfs {
    init_logging();
    Devfs::start(DevfsConfig::default(), rules).unwrap()
}

fn mount(devfs: &Devfs, id: u64) -> (MountId, Arc<MockAllocator>) {
    mount_with(devfs, id, MockAllocator::default())
}

fn mount_with(devfs: &Devfs, id: u64, allocator: MockAllocator) -> (MountId, Arc<MockAllocator>) {
    let allocator = Arc::new(allocator);
    let mount = MountId(id);
    devfs
        .add_mount(MountSpec::new(mount, format!("/dev{id}"), allocator.clone()))
        .unwrap();
    (mount, allocator)
}

fn device(devfs: &Devfs, name: &str, owner: u64, minor: u32) -> DeviceHandle {
    devfs.new_device(DeviceSpec::new(name, ImplId(owner), minor)).unwrap()
}

/// Real (non-synthetic) entry names of a directory.
fn names(devfs: &Devfs, mount: MountId, path: &str) -> Vec<String> {
    devfs
        .read_dir(mount, path, 0)
        .unwrap()
        .into_iter()
        .filter(|e| !e.is_synthetic())
        .map(|e| e.name)
        .collect()
}

fn same(a: &Arc<dyn Vnode>, b: &Arc<dyn Vnode>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// =============================================================================
// Registry and mount propagation
// =============================================================================

#[test]
fn add_mount_is_a_barrier() {
    let devfs = start();
    for i in 0..5 {
        let dev = device(&devfs, &format!("tty{i}"), 1, i);
        devfs.register_device(&dev, Access::default());
    }
    let (m, _) = mount(&devfs, 1);

    let leaves = devfs
        .read_dir(m, "", 0)
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == NodeKind::DeviceLeaf)
        .count();
    assert_eq!(leaves, 5);
}

#[test]
fn registration_reaches_existing_mounts() {
    let devfs = start();
    let (m1, _) = mount(&devfs, 1);
    let (m2, _) = mount(&devfs, 2);

    let null = device(&devfs, "null", 1, 2);
    devfs.register_device(&null, Access::new(0, 0, 0o666));
    devfs.drain().unwrap();

    for m in [m1, m2] {
        let node = devfs.lookup(m, "null").unwrap();
        assert_eq!(node.kind, NodeKind::DeviceLeaf);
        assert_eq!(node.access.mode, 0o666);
        assert_eq!(node.device, Some(null.id()));
    }
}

#[test]
fn registering_twice_is_a_noop() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let dev = device(&devfs, "zero", 1, 0);
    devfs.register_device(&dev, Access::default());
    devfs.register_device(&dev, Access::default());
    devfs.drain().unwrap();

    let mut seen = 0;
    devfs.scan(|_, _, _| seen += 1).unwrap();
    assert_eq!(seen, 1);
    assert_eq!(names(&devfs, m, ""), ["zero"]);
    assert!(dev.is_registered());
}

#[test]
fn unregister_twice_matches_once() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let dev = device(&devfs, "disk/da0", 1, 0);
    let other = device(&devfs, "disk/da1", 1, 1);
    devfs.register_device(&dev, Access::default());
    devfs.register_device(&other, Access::default());

    devfs.unregister_device(&dev);
    devfs.drain().unwrap();
    let once = (names(&devfs, m, "disk"), devfs.mount_stats(m).unwrap());

    devfs.unregister_device(&dev);
    devfs.drain().unwrap();
    let twice = (names(&devfs, m, "disk"), devfs.mount_stats(m).unwrap());

    assert_eq!(once, twice);
    assert_eq!(once.0, ["da1"]);
    assert_eq!(dev.ref_count(), 1);
}

#[test]
fn handle_with_directory_name() {
    let devfs = start();
    let dev = device(&devfs, "foo/0", 1, 0);
    devfs.register_device(&dev, Access::default());
    let (m, _) = mount(&devfs, 1);

    let foo = devfs.lookup(m, "foo").unwrap();
    assert_eq!(foo.kind, NodeKind::Directory);

    let entries = devfs.read_dir(m, "foo", 0).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries.iter().filter(|e| e.is_synthetic()).count(), 2);
    assert_eq!(entries[2].name, "0");
}

#[test]
fn alias_follows_its_target() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let real = device(&devfs, "real0", 1, 0);
    devfs.register_device(&real, Access::default());
    devfs.make_alias("link0", &real);
    devfs.drain().unwrap();

    let leaf = devfs.lookup(m, "real0").unwrap();
    assert_eq!(leaf.nlinks, 1);
    assert_eq!(devfs.lookup(m, "link0").unwrap().inode, leaf.inode);
    assert_eq!(devfs.read_link(m, "link0").unwrap(), "real0");

    devfs.unregister_device(&real);
    devfs.drain().unwrap();
    assert!(names(&devfs, m, "").is_empty());
}

#[test]
fn teardown_removes_mirrors_and_emptied_directories() {
    let devfs = start();
    let (m1, _) = mount(&devfs, 1);
    let dev = device(&devfs, "bus/usb/ugen0.1", 1, 0);
    devfs.register_device(&dev, Access::default());
    devfs.make_alias("links/ugen", &dev);
    devfs.make_alias("ugen0", &dev);
    let (m2, _) = mount(&devfs, 2);

    for m in [m1, m2] {
        assert_eq!(devfs.lookup(m, "bus/usb/ugen0.1").unwrap().nlinks, 2);
        assert_eq!(devfs.read_link(m, "links/ugen").unwrap(), "../bus/usb/ugen0.1");
    }

    devfs.unregister_device(&dev);
    devfs.drain().unwrap();
    for m in [m1, m2] {
        assert!(names(&devfs, m, "").is_empty());
        assert_eq!(devfs.mount_stats(m).unwrap().nodes, 1);
    }
}

#[test]
fn user_directories_survive_collection() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    devfs.make_dir(m, "pts", Access::new(0, 0, 0o755)).unwrap();
    let pty = device(&devfs, "pts/0", 1, 0);
    devfs.register_device(&pty, Access::default());
    devfs.unregister_device(&pty);
    devfs.drain().unwrap();

    assert_eq!(devfs.lookup(m, "pts").unwrap().kind, NodeKind::Directory);
    assert!(names(&devfs, m, "pts").is_empty());
}

#[test]
fn synchronous_requests_are_ordered() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    devfs.make_dir(m, "a", Access::default()).unwrap();
    let inner = devfs.make_dir(m, "a/b", Access::default()).unwrap();
    assert_eq!(inner.parent, Some(devfs.lookup(m, "a").unwrap().inode));
}

#[test]
fn concurrent_registration() {
    let devfs = start();
    let workers: Vec<_> = (0..4)
        .map(|t| {
            let devfs = devfs.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let spec = DeviceSpec::new(format!("cpu{t}/core{i}"), ImplId(t), i);
                    let dev = devfs.new_device(spec).unwrap();
                    devfs.register_device(&dev, Access::default());
                }
                devfs.drain().unwrap();
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let mut count = 0;
    devfs.scan(|_, _, alias| assert!(!alias)).unwrap();
    devfs.scan(|_, _, _| count += 1).unwrap();
    assert_eq!(count, 100);

    let (m, _) = mount(&devfs, 1);
    for t in 0..4 {
        assert_eq!(names(&devfs, m, &format!("cpu{t}")).len(), 25);
    }
}

#[test]
fn enumeration_cookies_are_stable() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let devs: Vec<_> = ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, n)| device(&devfs, &format!("disk/{n}"), 1, i as u32))
        .collect();
    for d in &devs {
        devfs.register_device(d, Access::default());
    }
    devfs.drain().unwrap();

    let all = devfs.read_dir(m, "disk", 0).unwrap();
    let b = all.iter().find(|e| e.name == "b").unwrap().clone();
    let rest: Vec<_> = devfs.read_dir(m, "disk", b.cookie).unwrap();
    let after_a: Vec<_> = rest.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(after_a, ["b", "c"]);

    devfs.unregister_device(&devs[0]);
    devfs.drain().unwrap();
    let after = devfs.read_dir(m, "disk", b.cookie).unwrap();
    assert_eq!(after, rest);
}

// =============================================================================
// Lookups by device
// =============================================================================

#[test]
fn find_by_name_and_identity() {
    let devfs = start();
    let dev = device(&devfs, "cd0", 3, 7);
    devfs.register_device(&dev, Access::default());
    devfs.make_alias("cdrom", &dev);

    assert_eq!(devfs.find_by_name("cd0"), Some(dev.clone()));
    assert_eq!(devfs.find_by_name("cdrom"), Some(dev.clone()));
    assert_eq!(devfs.find_by_identity(dev.id()), Some(dev.clone()));
    assert_eq!(devfs.find_by_name("cd1"), None);

    let mut seen = Vec::new();
    devfs.scan(|name, _, alias| seen.push((name.to_string(), alias))).unwrap();
    assert_eq!(seen, [("cd0".to_string(), false), ("cdrom".to_string(), true)]);
}

#[test]
fn destroy_alias_by_pattern() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let dev = device(&devfs, "ttyu0", 1, 0);
    devfs.register_device(&dev, Access::default());
    devfs.make_alias("cuau0", &dev);
    devfs.make_alias("cuau0.init", &dev);

    devfs.destroy_alias("cuau?", &dev);
    devfs.drain().unwrap();
    assert!(devfs.lookup(m, "cuau0").is_err());
    assert!(devfs.lookup(m, "cuau0.init").is_ok());

    devfs.destroy_alias("*", &dev);
    devfs.destroy_alias("*", &dev);
    devfs.drain().unwrap();
    assert_eq!(names(&devfs, m, ""), ["ttyu0"]);
    assert_eq!(devfs.lookup(m, "ttyu0").unwrap().nlinks, 0);
}

#[test]
fn destroy_alias_spares_links_it_did_not_make() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let dev = device(&devfs, "ttyu1", 1, 1);
    devfs.register_device(&dev, Access::default());
    devfs.drain().unwrap();
    devfs.make_symlink(m, "link0", "somewhere").unwrap();

    // The name is taken in the view, so the alias is recorded without a mirror.
    devfs.make_alias("link0", &dev);
    devfs.destroy_alias("link0", &dev);
    devfs.drain().unwrap();

    assert_eq!(devfs.read_link(m, "link0").unwrap(), "somewhere");
    assert_eq!(devfs.lookup(m, "ttyu1").unwrap().nlinks, 0);
}

#[test]
fn duplicate_alias_keeps_first() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let a = device(&devfs, "a", 1, 0);
    let b = device(&devfs, "b", 1, 1);
    devfs.register_device(&a, Access::default());
    devfs.register_device(&b, Access::default());
    devfs.make_alias("shared", &a);
    devfs.make_alias("shared", &b);
    devfs.drain().unwrap();

    assert_eq!(devfs.read_link(m, "shared").unwrap(), "a");
    assert_eq!(devfs.find_by_name("shared"), Some(a));
}

// =============================================================================
// Descendants
// =============================================================================

#[test]
fn descendant_operations() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let disk = device(&devfs, "da0", 1, 0);
    let s1 = DeviceSpec::new("da0s1", ImplId(1), 1)
        .with_parent(&disk)
        .with_flags(DeviceFlags::PRESENT);
    let s1 = devfs.new_device(s1).unwrap();
    let s2 = devfs
        .new_device(DeviceSpec::new("da0s2", ImplId(1), 2).with_parent(&disk))
        .unwrap();
    let s1a = devfs
        .new_device(DeviceSpec::new("da0s1a", ImplId(1), 3).with_parent(&s1))
        .unwrap();
    for d in [&disk, &s1, &s2, &s1a] {
        devfs.register_device(d, Access::default());
    }

    devfs.destroy_descendants_without_flag(&disk, DeviceFlags::PRESENT).unwrap();
    assert_eq!(names(&devfs, m, ""), ["da0", "da0s1"]);

    devfs.clear_flag_on_descendants(&disk, DeviceFlags::PRESENT).unwrap();
    assert!(!s1.flags().contains(DeviceFlags::PRESENT));

    devfs.destroy_descendants(&disk).unwrap();
    assert_eq!(names(&devfs, m, ""), ["da0"]);
    assert!(disk.is_registered());
}

#[test]
fn unregister_takes_descendants_along() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let bus = device(&devfs, "bus0", 1, 0);
    let child = devfs
        .new_device(DeviceSpec::new("bus0.dev0", ImplId(1), 1).with_parent(&bus))
        .unwrap();
    devfs.register_device(&bus, Access::default());
    devfs.register_device(&child, Access::default());
    devfs.unregister_device(&bus);
    devfs.drain().unwrap();

    assert!(!child.is_registered());
    assert!(names(&devfs, m, "").is_empty());
}

#[test]
fn destroy_matching_minor() {
    let devfs = start();
    let devs: Vec<_> = (0..3)
        .map(|i| device(&devfs, &format!("md{i}"), 4, i))
        .collect();
    let other = device(&devfs, "other", 5, 1);
    for d in devs.iter().chain([&other]) {
        devfs.register_device(d, Access::default());
    }

    let destroyed = devfs.destroy_matching(ImplId(4), MinorSelector::Exact(1));
    assert_eq!(destroyed.unwrap(), 1);
    assert_eq!(devfs.destroy_matching(ImplId(4), MinorSelector::Any).unwrap(), 2);
    assert_eq!(devfs.destroy_matching(ImplId(4), MinorSelector::Any).unwrap(), 0);
    assert!(other.is_registered());
}

// =============================================================================
// Mounts
// =============================================================================

#[test]
fn mount_errors_and_teardown() {
    let devfs = start();
    let (m, alloc) = mount(&devfs, 1);
    let again = MountSpec::new(m, "/again", alloc.clone());
    assert!(devfs.add_mount(again).unwrap_err().is_benign());

    let dev = device(&devfs, "null", 1, 0);
    devfs.register_device(&dev, Access::default());
    let vnode = devfs.vnode_for_path(m, "null").unwrap();
    drop(vnode);

    assert_eq!(devfs.remove_mount(m).unwrap(), 0);
    assert!(alloc.created_for("null")[0].detached.load(Ordering::SeqCst));
    assert!(matches!(devfs.remove_mount(m), Err(DevfsError::MountNotFound { .. })));
    assert!(matches!(
        devfs.lookup(m, "null"),
        Err(DevfsError::MountNotFound { .. })
    ));
    assert!(dev.is_registered());
}

#[test]
fn mount_stats_track_nodes() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    assert_eq!(
        devfs.mount_stats(m).unwrap(),
        MountStats {
            nodes: 1,
            orphans: 0,
            leaked_total: 0
        }
    );
    let dev = device(&devfs, "a/b", 1, 0);
    devfs.register_device(&dev, Access::default());
    devfs.drain().unwrap();
    assert_eq!(devfs.mount_stats(m).unwrap().nodes, 3);
}

// =============================================================================
// Rules
// =============================================================================

struct TtyRules;

impl RuleEngine for TtyRules {
    fn apply(&self, target: &mut RuleTarget) {
        let name = target.info().name.clone();
        if target.device_name().is_some_and(|d| d.starts_with("tty")) {
            target.set_access(Access::new(0, 4, 0o660));
            target.add_link(format!("term/{name}"));
        }
        match name.as_str() {
            "secret" => target.set_hidden(true),
            "quiet" => target.set_invisible(true),
            _ => {}
        }
    }
}

#[test]
fn rules_tag_new_nodes() {
    let devfs = start_with(Arc::new(TtyRules));
    let (m, _) = mount(&devfs, 1);
    for (i, name) in ["ttyS0", "secret", "quiet"].iter().enumerate() {
        let dev = device(&devfs, name, 1, i as u32);
        devfs.register_device(&dev, Access::new(0, 0, 0o600));
    }
    devfs.drain().unwrap();

    assert_eq!(devfs.lookup(m, "ttyS0").unwrap().access, Access::new(0, 4, 0o660));
    assert_eq!(devfs.read_link(m, "term/ttyS0").unwrap(), "../ttyS0");
    assert!(matches!(devfs.lookup(m, "secret"), Err(DevfsError::NotFound { .. })));
    assert!(devfs.lookup(m, "quiet").is_ok());
    assert_eq!(names(&devfs, m, ""), ["ttyS0", "term"]);
}

#[test]
fn reset_and_reapply_rules() {
    let devfs = start_with(Arc::new(TtyRules));
    let (m, _) = mount(&devfs, 1);
    let tty = device(&devfs, "ttyS0", 1, 0);
    let secret = device(&devfs, "secret", 1, 1);
    devfs.register_device(&tty, Access::new(0, 0, 0o600));
    devfs.register_device(&secret, Access::new(0, 0, 0o600));

    devfs.reset_rules(MountSelector::All);
    devfs.drain().unwrap();
    assert_eq!(devfs.lookup(m, "ttyS0").unwrap().access.mode, 0o600);
    assert!(devfs.lookup(m, "secret").is_ok());
    assert!(devfs.lookup(m, "term").is_err());

    devfs.apply_rules(MountSelector::parse("/elsewhere"));
    devfs.drain().unwrap();
    assert!(devfs.lookup(m, "term").is_err());

    devfs.apply_rules(MountSelector::parse("/dev1"));
    devfs.drain().unwrap();
    assert_eq!(devfs.lookup(m, "ttyS0").unwrap().access.mode, 0o660);
    assert!(devfs.lookup(m, "term/ttyS0").is_ok());
    assert!(devfs.lookup(m, "secret").is_err());
}

/// Aliases every `uart*` device as `serial*` from inside the rule pass.
#[derive(Default)]
struct ReentrantRules {
    devfs: OnceLock<Devfs>,
}

impl RuleEngine for ReentrantRules {
    fn apply(&self, target: &mut RuleTarget) {
        let Some(devfs) = self.devfs.get() else {
            return;
        };
        let Some(name) = target.device_name().filter(|n| n.starts_with("uart")) else {
            return;
        };
        if let Some(dev) = devfs.find_by_name(name) {
            devfs.make_alias(&name.replace("uart", "serial"), &dev);
        }
    }
}

#[test]
fn rules_can_reenter_the_service() {
    let rules = Arc::new(ReentrantRules::default());
    let devfs = start_with(rules.clone());
    let _ = rules.devfs.set(devfs.clone());
    let (m, _) = mount(&devfs, 1);

    let uart = device(&devfs, "uart0", 1, 0);
    devfs.register_device(&uart, Access::default());
    devfs.drain().unwrap();

    assert_eq!(devfs.find_by_name("serial0"), Some(uart));
    assert_eq!(devfs.read_link(m, "serial0").unwrap(), "uart0");
    devfs.shutdown();
}

// =============================================================================
// Clone handlers
// =============================================================================

#[test]
fn clone_handler_registers_on_demand() {
    let devfs = start();
    let (m1, _) = mount(&devfs, 1);
    let (m2, _) = mount(&devfs, 2);

    let next = Arc::new(AtomicU32::new(0));
    let service = devfs.clone();
    let handler = move |_: &str| -> Option<DeviceHandle> {
        let n = next.fetch_add(1, Ordering::SeqCst);
        let dev = service
            .new_device(DeviceSpec::new(format!("pts/{n}"), ImplId(9), n))
            .ok()?;
        service.register_device(&dev, Access::new(0, 5, 0o620));
        Some(dev)
    };
    devfs.add_clone_handler("ptmx", Arc::new(handler)).unwrap();

    let first = devfs.open_clone(m1, "ptmx").unwrap();
    assert_eq!(first.name, "0");
    assert_eq!(first.access.mode, 0o620);
    let second = devfs.open_clone(m1, "ptmx").unwrap();
    assert_eq!(second.name, "1");
    assert_eq!(names(&devfs, m2, "pts"), ["0", "1"]);

    assert!(matches!(
        devfs.open_clone(m1, "ptm"),
        Err(DevfsError::NotFound { .. })
    ));
    assert!(matches!(
        devfs.open_clone(MountId(99), "ptmx"),
        Err(DevfsError::MountNotFound { .. })
    ));

    devfs.remove_clone_handler("ptmx").unwrap();
    assert!(devfs.open_clone(m1, "ptmx").is_err());
    devfs.shutdown();
}

#[test]
fn clone_handler_device_only_in_opening_mount() {
    let devfs = start();
    let (m1, _) = mount(&devfs, 1);
    let (m2, _) = mount(&devfs, 2);
    let made = device(&devfs, "bpf0", 2, 0);
    let handed = made.clone();
    let handler = move |_: &str| -> Option<DeviceHandle> { Some(handed.clone()) };
    devfs.add_clone_handler("bpf", Arc::new(handler)).unwrap();
    let dup = devfs.add_clone_handler("bpf", Arc::new(NoClone));
    assert!(dup.unwrap_err().is_benign());

    let leaf = devfs.open_clone(m1, "bpf").unwrap();
    assert_eq!(leaf.device, Some(made.id()));
    assert!(devfs.lookup(m2, "bpf0").is_err());
    assert_eq!(devfs.open_clone(m1, "bpf").unwrap().inode, leaf.inode);
}

struct NoClone;

impl CloneHandler for NoClone {
    fn clone_device(&self, _name: &str) -> Option<DeviceHandle> {
        None
    }
}

#[test]
fn declining_handler_is_not_found() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    devfs.add_clone_handler("tun", Arc::new(NoClone)).unwrap();
    assert!(matches!(devfs.open_clone(m, "tun"), Err(DevfsError::NotFound { .. })));
    assert!(matches!(
        devfs.add_clone_handler("", Arc::new(NoClone)),
        Err(DevfsError::InvalidName { .. })
    ));
}

// =============================================================================
// User operations
// =============================================================================

#[test]
fn user_nodes() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    let dev = device(&devfs, "null", 1, 0);
    devfs.register_device(&dev, Access::default());

    devfs.make_dir(m, "fd", Access::new(0, 0, 0o555)).unwrap();
    let link = devfs.make_symlink(m, "stdin", "fd/0").unwrap();
    assert!(link.is_symlink());
    assert_eq!(devfs.read_link(m, "stdin").unwrap(), "fd/0");
    devfs.make_symlink(m, "fd/null", "/null").unwrap();
    assert_eq!(devfs.lookup(m, "fd/null").unwrap().kind, NodeKind::DeviceLeaf);

    assert!(devfs.make_dir(m, "fd", Access::default()).unwrap_err().is_benign());
    assert!(matches!(
        devfs.remove_dir(m, "fd"),
        Err(DevfsError::DirectoryNotEmpty { .. })
    ));
    assert!(matches!(devfs.remove(m, "fd"), Err(DevfsError::IsADirectory { .. })));
    assert!(matches!(
        devfs.remove_dir(m, "stdin"),
        Err(DevfsError::NotADirectory { .. })
    ));
    assert!(matches!(
        devfs.remove(m, "null"),
        Err(DevfsError::PermissionDenied { .. })
    ));

    devfs.remove(m, "fd/null").unwrap();
    devfs.remove_dir(m, "fd").unwrap();
    devfs.remove(m, "stdin").unwrap();
    assert_eq!(names(&devfs, m, ""), ["null"]);
}

#[test]
fn symlink_loops_are_bounded() {
    let devfs = start();
    let (m, _) = mount(&devfs, 1);
    devfs.make_symlink(m, "a", "b").unwrap();
    devfs.make_symlink(m, "b", "a").unwrap();
    assert!(matches!(devfs.lookup(m, "a"), Err(DevfsError::TooManyLinks { .. })));
    assert_eq!(devfs.read_link(m, "a").unwrap(), "b");
}

#[test]
fn removed_node_waits_for_reclaim() {
    let devfs = start();
    let (m, alloc) = mount(&devfs, 1);
    let node = devfs.make_symlink(m, "keep", "elsewhere").unwrap();
    let vnode = devfs.materialize(m, node.inode).unwrap();

    devfs.remove(m, "keep").unwrap();
    assert!(devfs.lookup(m, "keep").is_err());
    assert_eq!(devfs.mount_stats(m).unwrap().orphans, 1);
    assert!(devfs.node_for_inode(m, node.inode).is_none());

    drop(vnode);
    devfs.reclaim(m, node.inode).unwrap();
    assert_eq!(devfs.mount_stats(m).unwrap().orphans, 0);
    assert_eq!(devfs.mount_stats(m).unwrap().nodes, 1);
    assert_eq!(alloc.allocations(), 1);
}

// =============================================================================
// Materializer
// =============================================================================

#[test]
fn materialize_reuses_bound_object() {
    let devfs = start();
    let (m, alloc) = mount(&devfs, 1);
    let dev = device(&devfs, "mem", 1, 0);
    devfs.register_device(&dev, Access::default());

    let a = devfs.vnode_for_path(m, "mem").unwrap();
    let inode = devfs.lookup(m, "mem").unwrap().inode;
    let b = devfs.node_for_inode(m, inode).unwrap();
    assert!(same(&a, &b));
    assert_eq!(alloc.allocations(), 1);
}

#[test]
fn materialize_retries_while_busy() {
    let devfs = start();
    let (m, alloc) = mount_with(
        &devfs,
        1,
        MockAllocator {
            busy: 3,
            ..Default::default()
        },
    );
    let dev = device(&devfs, "kmem", 1, 0);
    devfs.register_device(&dev, Access::default());

    let inode = devfs.lookup(m, "kmem").unwrap().inode;
    // The first call binds without acquiring; the second spins through Busy.
    let first = devfs.materialize(m, inode).unwrap();
    let second = devfs.materialize(m, inode).unwrap();
    assert!(same(&first, &second));
    assert_eq!(alloc.created_for("kmem")[0].busy_left.load(Ordering::SeqCst), 0);
}

#[test]
fn materialize_race_has_one_winner() {
    let devfs = start();
    let (m, alloc) = mount_with(
        &devfs,
        1,
        MockAllocator {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        },
    );
    let dev = device(&devfs, "random", 1, 0);
    devfs.register_device(&dev, Access::default());
    let inode = devfs.lookup(m, "random").unwrap().inode;

    let barrier = Arc::new(Barrier::new(8));
    let racers: Vec<_> = (0..8)
        .map(|_| {
            let devfs = devfs.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                devfs.materialize(m, inode).unwrap()
            })
        })
        .collect();
    let won: Vec<Arc<dyn Vnode>> = racers
        .into_iter()
        .map(|r| r.join().unwrap())
        .collect();

    assert!(won.iter().all(|v| same(v, &won[0])));
    assert_eq!(alloc.allocations() - alloc.discarded.load(Ordering::SeqCst), 1);
}

#[test]
fn unregister_detaches_bound_objects() {
    let devfs = start();
    let (m, alloc) = mount(&devfs, 1);
    let dev = device(&devfs, "klog", 1, 0);
    devfs.register_device(&dev, Access::default());
    let inode = devfs.lookup(m, "klog").unwrap().inode;
    let _held = devfs.materialize(m, inode).unwrap();

    devfs.unregister_device(&dev);
    devfs.drain().unwrap();
    assert!(alloc.created_for("klog")[0].detached.load(Ordering::SeqCst));
    assert!(devfs.node_for_inode(m, inode).is_none());
    assert!(matches!(
        devfs.materialize(m, inode),
        Err(DevfsError::InodeNotFound { .. })
    ));
}

// =============================================================================
// Implementation units and lifecycle
// =============================================================================

#[test]
fn implementation_units_are_shared_and_recycled() {
    init_logging();
    let config = DevfsConfig::default().with_max_impl_units(1);
    let devfs = Devfs::start(config, Arc::new(NoRules)).unwrap();

    let a0 = device(&devfs, "a0", 1, 0);
    let a1 = device(&devfs, "a1", 1, 1);
    assert_eq!(a0.id().unit(), a1.id().unit());
    assert!(matches!(
        devfs.new_device(DeviceSpec::new("b0", ImplId(2), 0)),
        Err(DevfsError::ResourceExhausted { .. })
    ));

    drop(a0);
    drop(a1);
    assert!(devfs.new_device(DeviceSpec::new("b0", ImplId(2), 0)).is_ok());
}

#[test]
fn shutdown_refuses_later_requests() {
    let devfs = start();
    let (m, alloc) = mount(&devfs, 1);
    let dev = device(&devfs, "console", 1, 0);
    devfs.register_device(&dev, Access::default());
    let _held = devfs.vnode_for_path(m, "console").unwrap();
    assert_eq!(devfs.phase(), Phase::Running);

    devfs.shutdown();
    assert_eq!(devfs.phase(), Phase::Stopping);
    assert!(alloc.created_for("console")[0].detached.load(Ordering::SeqCst));

    devfs.register_device(&dev, Access::default());
    assert_eq!(devfs.find_by_name("console"), None);
    assert_eq!(devfs.drain(), Err(DevfsError::Stopped));
    assert!(matches!(
        devfs.add_mount(MountSpec::new(MountId(2), "/x", alloc)),
        Err(DevfsError::Stopped)
    ));
    assert!(matches!(
        devfs.lookup(m, "console"),
        Err(DevfsError::MountNotFound { .. })
    ));

    // A second shutdown is a no-op.
    devfs.shutdown();
}

#[test]
fn dropping_last_handle_stops_the_actor() {
    let devfs = start();
    let other = devfs.clone();
    drop(devfs);
    assert_eq!(other.phase(), Phase::Running);
    assert!(other.drain().is_ok());
    drop(other);
}
