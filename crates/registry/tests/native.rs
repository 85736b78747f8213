//! Native loader driven by module entry points linked into the test binary.

use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use comreg_cabi::{
	COMREG_ABI_VERSION_V1, ComregCid, ComregComponentV1, ComregHostV1, ComregModuleEntryV1, ComregModuleV1, ComregStatus, ComregStr,
};
use comreg_registry::native::{ModuleOpener, NativeInstance, OpenedModule, StaticModuleTable};
use comreg_registry::{AutoRegisterSummary, Cid, ComponentError, ComponentManager, Iid, Location, ManagerConfig, NATIVE_KIND, When};
use comreg_store::MemoryStore;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serial_test::serial;

const BASE_CID: u128 = 0x0000_0001_0000_4000_8000_0000_0000_00b1;
const DEP_CID: u128 = 0x0000_0001_0000_4000_8000_0000_0000_00d1;
const REBUILT_CID: u128 = 0x0000_0001_0000_4000_8000_0000_0000_00e1;

static LIVE_INSTANCES: AtomicUsize = AtomicUsize::new(0);
static BASE_SHUTDOWNS: AtomicUsize = AtomicUsize::new(0);

static BASE_COMPONENTS: [ComregComponentV1; 1] = [ComregComponentV1 {
	cid: ComregCid::from_u128(BASE_CID),
	class_name: ComregStr::from_static("Base"),
	contract_id: ComregStr::from_static("@test/native-base;1"),
}];

static DEP_COMPONENTS: [ComregComponentV1; 1] = [ComregComponentV1 {
	cid: ComregCid::from_u128(DEP_CID),
	class_name: ComregStr::from_static("Dependent"),
	contract_id: ComregStr::EMPTY,
}];

static REBUILT_COMPONENTS: [ComregComponentV1; 1] = [ComregComponentV1 {
	cid: ComregCid::from_u128(REBUILT_CID),
	class_name: ComregStr::from_static("Rebuilt"),
	contract_id: ComregStr::from_static("@test/native-rebuilt;1"),
}];

static DEP_REQUIRES: [ComregCid; 1] = [ComregCid::from_u128(BASE_CID)];

unsafe extern "C" fn create(_cid: *const ComregCid, _iid: *const ComregCid, out: *mut *mut c_void) -> ComregStatus {
	LIVE_INSTANCES.fetch_add(1, Ordering::SeqCst);
	// SAFETY: the host passes a valid out pointer.
	unsafe { *out = Box::into_raw(Box::new(42u32)).cast() };
	ComregStatus::Ok
}

unsafe extern "C" fn release(instance: *mut c_void) {
	LIVE_INSTANCES.fetch_sub(1, Ordering::SeqCst);
	// SAFETY: `instance` came from `create`.
	drop(unsafe { Box::from_raw(instance.cast::<u32>()) });
}

extern "C" fn can_unload() -> bool {
	LIVE_INSTANCES.load(Ordering::SeqCst) == 0
}

extern "C" fn base_shutdown() {
	BASE_SHUTDOWNS.fetch_add(1, Ordering::SeqCst);
}

unsafe fn fill(host: *const ComregHostV1, out: *mut ComregModuleV1, module: ComregModuleV1) -> ComregStatus {
	if host.is_null() || out.is_null() {
		return ComregStatus::Failed;
	}
	let host = unsafe { &*host };
	if host.abi_version != COMREG_ABI_VERSION_V1 {
		return ComregStatus::Incompatible;
	}
	if let Some(log) = host.log {
		log(ComregStr::from_static("test module entered"));
	}
	unsafe { *out = module };
	ComregStatus::Ok
}

unsafe extern "C" fn base_entry(host: *const ComregHostV1, out: *mut ComregModuleV1) -> ComregStatus {
	let module = ComregModuleV1 {
		abi_version: COMREG_ABI_VERSION_V1,
		components: BASE_COMPONENTS.as_ptr(),
		component_count: BASE_COMPONENTS.len(),
		create_instance: Some(create),
		release_instance: Some(release),
		can_unload: Some(can_unload),
		shutdown: Some(base_shutdown),
		..ComregModuleV1::empty()
	};
	unsafe { fill(host, out, module) }
}

unsafe extern "C" fn dep_entry(host: *const ComregHostV1, out: *mut ComregModuleV1) -> ComregStatus {
	let module = ComregModuleV1 {
		abi_version: COMREG_ABI_VERSION_V1,
		components: DEP_COMPONENTS.as_ptr(),
		component_count: DEP_COMPONENTS.len(),
		requires: DEP_REQUIRES.as_ptr(),
		require_count: DEP_REQUIRES.len(),
		create_instance: Some(create),
		release_instance: Some(release),
		..ComregModuleV1::empty()
	};
	unsafe { fill(host, out, module) }
}

unsafe extern "C" fn rebuilt_entry(host: *const ComregHostV1, out: *mut ComregModuleV1) -> ComregStatus {
	let module = ComregModuleV1 {
		abi_version: COMREG_ABI_VERSION_V1,
		components: REBUILT_COMPONENTS.as_ptr(),
		component_count: REBUILT_COMPONENTS.len(),
		create_instance: Some(create),
		release_instance: Some(release),
		..ComregModuleV1::empty()
	};
	unsafe { fill(host, out, module) }
}

unsafe extern "C" fn wrong_abi_entry(_host: *const ComregHostV1, out: *mut ComregModuleV1) -> ComregStatus {
	unsafe {
		*out = ComregModuleV1 {
			abi_version: COMREG_ABI_VERSION_V1 + 1,
			..ComregModuleV1::empty()
		};
	}
	ComregStatus::Ok
}

fn table() -> Arc<StaticModuleTable> {
	Arc::new(
		StaticModuleTable::new()
			.with_module("a_dependent.so", dep_entry)
			.with_module("b_base.so", base_entry)
			.with_module("wrong_abi.so", wrong_abi_entry),
	)
}

/// Serves every path from one entry point that can be swapped, standing in
/// for a library rebuilt on disk.
struct SwappableOpener {
	entry: Mutex<ComregModuleEntryV1>,
}

impl ModuleOpener for SwappableOpener {
	fn open(&self, _path: &Path) -> comreg_registry::Result<OpenedModule> {
		Ok(OpenedModule::linked(*self.entry.lock()))
	}
}

fn manager_with(dir: &Path, opener: Arc<dyn ModuleOpener>) -> ComponentManager {
	let config = ManagerConfig {
		components_dir: dir.to_path_buf(),
		..ManagerConfig::default()
	};
	let manager = ComponentManager::with_opener(Arc::new(MemoryStore::new()), config, opener);
	manager.init().unwrap();
	manager
}

fn manager_in(dir: &Path) -> ComponentManager {
	manager_with(dir, table())
}

fn touch(dir: &Path, name: &str) {
	std::fs::write(dir.join(name), name.as_bytes()).unwrap();
}

/// The dependent module waits for the base module, then both register and instantiate.
#[test]
#[serial]
fn test_sweep_registers_and_defers() {
	let dir = tempfile::tempdir().unwrap();
	touch(dir.path(), "a_dependent.so");
	touch(dir.path(), "b_base.so");
	touch(dir.path(), "README.txt");
	let manager = manager_in(dir.path());

	let summary = manager.auto_register(When::Startup, None).unwrap();
	assert_eq!(
		summary,
		AutoRegisterSummary {
			registered: 1,
			deferred_passes: 2,
		}
	);

	let base = Cid::from_u128(BASE_CID);
	let dep = Cid::from_u128(DEP_CID);
	assert_eq!(manager.contract_id_to_cid("@test/native-base;1").unwrap(), base);
	assert_eq!(manager.records().component_count(&Location::Rel("b_base.so".into())).unwrap(), 1);
	assert_eq!(manager.records().component_count(&Location::Rel("a_dependent.so".into())).unwrap(), 1);

	let object = manager.create_instance(&dep, None, &Iid::SUPPORTS).unwrap();
	let instance = object.downcast_ref::<NativeInstance>().unwrap();
	assert_eq!(instance.cid(), dep);
	// SAFETY: the test module hands out boxed u32s.
	assert_eq!(unsafe { *instance.handle().cast::<u32>() }, 42);
	drop(object);

	// Unchanged modules are not registered again.
	assert_eq!(manager.auto_register(When::Startup, None).unwrap().registered, 0);
}

/// Early unload honours `can_unload`; instances keep their module alive.
#[test]
#[serial]
fn test_timer_release_respects_live_instances() {
	let dir = tempfile::tempdir().unwrap();
	touch(dir.path(), "b_base.so");
	let manager = manager_in(dir.path());
	manager.auto_register(When::Startup, None).unwrap();

	let base = Cid::from_u128(BASE_CID);
	let shutdowns = BASE_SHUTDOWNS.load(Ordering::SeqCst);
	let object = manager.create_instance(&base, None, &Iid::SUPPORTS).unwrap();

	manager.free_libraries().unwrap();
	assert_eq!(BASE_SHUTDOWNS.load(Ordering::SeqCst), shutdowns);

	drop(object);
	manager.free_libraries().unwrap();
	assert_eq!(BASE_SHUTDOWNS.load(Ordering::SeqCst), shutdowns + 1);

	// Reloaded on demand.
	let object = manager.create_instance(&base, None, &Iid::SUPPORTS).unwrap();
	drop(object);
	manager.shutdown().unwrap();
	assert_eq!(BASE_SHUTDOWNS.load(Ordering::SeqCst), shutdowns + 2);
	assert_eq!(LIVE_INSTANCES.load(Ordering::SeqCst), 0);
}

#[test]
#[serial]
fn test_unreadable_library_fails_to_load() {
	let dir = tempfile::tempdir().unwrap();
	touch(dir.path(), "garbage.so");
	touch(dir.path(), "wrong_abi.so");
	let manager = manager_in(dir.path());

	// The sweep skips broken modules.
	assert_eq!(manager.auto_register(When::Startup, None).unwrap().registered, 0);

	let native = manager.loader_for_kind(NATIVE_KIND).unwrap();
	for name in ["garbage.so", "wrong_abi.so"] {
		let err = native
			.auto_register_one(&manager, When::Component, &dir.path().join(name))
			.unwrap_err();
		assert!(matches!(err, ComponentError::ModuleLoadFailed { .. }), "{name}: {err}");
	}
}

#[test]
#[serial]
fn test_unregister_module() {
	let dir = tempfile::tempdir().unwrap();
	touch(dir.path(), "b_base.so");
	let manager = manager_in(dir.path());
	manager.auto_register(When::Startup, None).unwrap();
	let base = Cid::from_u128(BASE_CID);
	assert!(manager.is_registered(&base));

	assert!(manager.auto_unregister_component(When::Component, &dir.path().join("b_base.so")).unwrap());
	assert!(!manager.is_registered(&base));
	assert!(manager.records().modules().unwrap().is_empty());
}

#[test]
#[serial]
fn test_register_lib_location() {
	let manager = manager_in(Path::new("/nonexistent"));
	let cid = Cid::from_u128(0x5157);
	manager.register_component_lib(&cid, Some("Sys"), None, "b_base.so", true, true).unwrap();

	let stored = manager.records().read_class(&cid).unwrap().unwrap();
	assert_eq!(stored.location, Location::Lib("b_base.so".into()));
	assert_eq!(stored.kind, NATIVE_KIND);
	// The module behind the library does not export this CID.
	assert!(matches!(
		manager.create_instance(&cid, None, &Iid::SUPPORTS),
		Err(ComponentError::FactoryNotRegistered(_))
	));
}

/// A rebuilt module is reopened once its old image is no longer in use.
#[test]
#[serial]
fn test_changed_module_is_reloaded() {
	let dir = tempfile::tempdir().unwrap();
	touch(dir.path(), "w.so");
	let opener = Arc::new(SwappableOpener {
		entry: Mutex::new(base_entry),
	});
	let manager = manager_with(dir.path(), opener.clone());
	assert_eq!(manager.auto_register(When::Startup, None).unwrap().registered, 1);

	let base = Cid::from_u128(BASE_CID);
	let rebuilt = Cid::from_u128(REBUILT_CID);
	let held = manager.create_instance(&base, None, &Iid::SUPPORTS).unwrap();

	*opener.entry.lock() = rebuilt_entry;
	std::fs::write(dir.path().join("w.so"), b"rebuilt module image").unwrap();

	// The old image still backs a live instance: nothing is reloaded.
	assert_eq!(manager.auto_register(When::Startup, None).unwrap().registered, 0);
	assert!(!manager.is_registered(&rebuilt));

	let shutdowns = BASE_SHUTDOWNS.load(Ordering::SeqCst);
	drop(held);
	assert_eq!(manager.auto_register(When::Startup, None).unwrap().registered, 1);
	assert_eq!(BASE_SHUTDOWNS.load(Ordering::SeqCst), shutdowns + 1);
	assert_eq!(manager.contract_id_to_cid("@test/native-rebuilt;1").unwrap(), rebuilt);

	let object = manager.create_instance(&rebuilt, None, &Iid::SUPPORTS).unwrap();
	assert_eq!(object.downcast_ref::<NativeInstance>().unwrap().cid(), rebuilt);
	drop(object);

	assert_eq!(manager.auto_register(When::Startup, None).unwrap().registered, 0);
}
