use std::ffi::c_void;
use std::sync::Arc;

use comreg_cabi::{COMREG_ABI_VERSION_V1, ComregCid, ComregCreateInstanceV1, ComregHostV1, ComregModuleV1, ComregStatus, ComregStr};
use comreg_primitives::{Cid, ContractId, Iid};
use libloading::Library;
use tracing::{debug, info};

use super::opener::OpenedModule;
use crate::error::{ComponentError, Result};
use crate::factory::{Factory, Object};
use crate::location::Location;

/// A component listed in a module's table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleComponent {
	pub cid: Cid,
	pub class_name: Option<String>,
	pub contract_id: Option<ContractId>,
}

#[derive(Copy, Clone)]
struct Callbacks {
	create_instance: Option<ComregCreateInstanceV1>,
	release_instance: Option<unsafe extern "C" fn(*mut c_void)>,
	can_unload: Option<extern "C" fn() -> bool>,
	shutdown: Option<extern "C" fn()>,
}

/// A loaded native module.
///
/// The library stays mapped for as long as any factory or instance created
/// from the module holds its `Arc`. The module's `shutdown` callback runs when
/// the last one goes away.
pub struct NativeModule {
	location: Location,
	components: Vec<ModuleComponent>,
	requires: Vec<Cid>,
	callbacks: Callbacks,
	// Declared last so it is unmapped after `Drop::drop` has run.
	_library: Option<Library>,
}

extern "C" fn host_log(message: ComregStr) {
	// SAFETY: modules pass a slice valid for the duration of the call.
	let text = unsafe { message.to_string_lossy() };
	info!(target: "comreg::module", "{text}");
}

fn cid_from_abi(cid: &ComregCid) -> Cid {
	Cid::from_bytes(cid.bytes)
}

fn abi_cid(bytes: &[u8; 16]) -> ComregCid {
	ComregCid { bytes: *bytes }
}

impl NativeModule {
	/// Runs the module entry point and copies out its component table.
	pub(crate) fn load(opened: OpenedModule, location: Location) -> Result<Self> {
		let host = ComregHostV1 {
			abi_version: COMREG_ABI_VERSION_V1,
			log: Some(host_log),
		};
		let mut table = ComregModuleV1::empty();
		// SAFETY: both pointers are valid for the call; the entry point was
		// resolved under the ABI's fixed symbol name.
		let status = unsafe { (opened.entry)(&host, &mut table) };
		match status {
			ComregStatus::Ok => {}
			ComregStatus::Incompatible => return Err(ComponentError::load_failed(&location, "module rejected host ABI version")),
			other => return Err(ComponentError::load_failed(&location, format!("entry point returned {other:?}"))),
		}
		if table.abi_version != COMREG_ABI_VERSION_V1 {
			return Err(ComponentError::load_failed(
				&location,
				format!("incompatible ABI version: host={COMREG_ABI_VERSION_V1}, module={}", table.abi_version),
			));
		}

		// SAFETY: the module guarantees both tables outlive the module.
		let components = unsafe { table.components() }
			.iter()
			.map(|c| ModuleComponent {
				cid: cid_from_abi(&c.cid),
				class_name: Some(unsafe { c.class_name.to_string_lossy() }).filter(|s| !s.is_empty()),
				contract_id: ContractId::non_empty(Some(unsafe { c.contract_id.to_string_lossy() }).as_deref()),
			})
			.collect();
		let requires = unsafe { table.requires() }.iter().map(cid_from_abi).collect();

		debug!(location = %location, "native module loaded");
		Ok(Self {
			location,
			components,
			requires,
			callbacks: Callbacks {
				create_instance: table.create_instance,
				release_instance: table.release_instance,
				can_unload: table.can_unload,
				shutdown: table.shutdown,
			},
			_library: opened.library,
		})
	}

	pub fn location(&self) -> &Location {
		&self.location
	}

	pub fn components(&self) -> &[ModuleComponent] {
		&self.components
	}

	/// CIDs that must be registered before this module's components can be.
	pub fn requires(&self) -> &[Cid] {
		&self.requires
	}

	pub fn exports(&self, cid: &Cid) -> bool {
		self.components.iter().any(|c| c.cid == *cid)
	}

	/// Whether the module agrees to an early unload. Modules without the
	/// callback stay loaded until shutdown.
	pub fn can_unload(&self) -> bool {
		self.callbacks.can_unload.is_some_and(|can_unload| can_unload())
	}
}

impl Drop for NativeModule {
	fn drop(&mut self) {
		if let Some(shutdown) = self.callbacks.shutdown {
			shutdown();
		}
		debug!(location = %self.location, "native module unloaded");
	}
}

/// Factory for one class of a native module.
pub struct NativeFactory {
	module: Arc<NativeModule>,
	cid: Cid,
}

impl NativeFactory {
	pub(crate) fn new(module: Arc<NativeModule>, cid: Cid) -> Self {
		Self { module, cid }
	}
}

impl Factory for NativeFactory {
	fn create_instance(&self, outer: Option<&Object>, iid: &Iid) -> Result<Object> {
		if outer.is_some() {
			return Err(ComponentError::Failed(format!("{} does not support aggregation", self.cid)));
		}
		let Some(create) = self.module.callbacks.create_instance else {
			return Err(ComponentError::Failed(format!("module {} cannot create instances", self.module.location)));
		};
		let cid = abi_cid(self.cid.as_bytes());
		let abi_iid = abi_cid(iid.as_bytes());
		let mut handle: *mut c_void = std::ptr::null_mut();
		// SAFETY: all pointers are valid for the call; the module owns `handle`.
		let status = unsafe { create(&cid, &abi_iid, &mut handle) };
		match status {
			ComregStatus::Ok if !handle.is_null() => Ok(Arc::new(NativeInstance {
				module: self.module.clone(),
				handle,
				cid: self.cid,
				iid: *iid,
			})),
			ComregStatus::Ok => Err(ComponentError::Failed(format!("{} returned a null instance", self.cid))),
			ComregStatus::NoInterface => Err(ComponentError::NoInterface(*iid)),
			ComregStatus::NotFound => Err(ComponentError::not_registered(self.cid)),
			other => Err(ComponentError::Failed(format!("{} failed to create an instance: {other:?}", self.cid))),
		}
	}
}

/// An instance created by a native module. Released through the module when dropped.
pub struct NativeInstance {
	module: Arc<NativeModule>,
	handle: *mut c_void,
	cid: Cid,
	iid: Iid,
}

// SAFETY: the handle is opaque to the host and only ever passed back to the
// module's release callback; modules hand out thread-agnostic instances.
unsafe impl Send for NativeInstance {}
unsafe impl Sync for NativeInstance {}

impl NativeInstance {
	/// The module's handle for this instance.
	pub fn handle(&self) -> *mut c_void {
		self.handle
	}

	pub fn cid(&self) -> Cid {
		self.cid
	}

	pub fn iid(&self) -> Iid {
		self.iid
	}
}

impl Drop for NativeInstance {
	fn drop(&mut self) {
		if let Some(release) = self.module.callbacks.release_instance {
			// SAFETY: the handle came from this module's create_instance and
			// is released exactly once.
			unsafe { release(self.handle) };
		}
	}
}
