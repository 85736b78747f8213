//! Native module loader.
//!
//! Native modules are dynamic libraries exporting `comreg_module_entry_v1`
//! (see `comreg-cabi`). The loader opens them through a [`ModuleOpener`],
//! registers the components they list, defers modules whose required CIDs are
//! not registered yet, and remembers file stamps so unchanged modules are not
//! rescanned.

mod module;
mod opener;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use comreg_primitives::{Cid, When};
pub use module::{ModuleComponent, NativeFactory, NativeInstance, NativeModule};
pub use opener::{DylibOpener, ModuleOpener, OpenedModule, StaticModuleTable};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::entry::ModuleDescriptor;
use crate::error::{ComponentError, Result};
use crate::factory::Factory;
use crate::loader::Loader;
use crate::location::Location;
use crate::manager::ComponentManager;
use crate::records::ModuleStamp;

/// Module kind served by [`NativeLoader`].
pub const NATIVE_KIND: &str = "application/x-comreg-native";

struct DeferredModule {
	path: PathBuf,
	stamp: ModuleStamp,
	module: Arc<NativeModule>,
}

#[derive(Default)]
struct NativeState {
	/// Loaded modules by encoded location.
	modules: HashMap<String, Arc<NativeModule>>,
	deferred: Vec<DeferredModule>,
}

pub struct NativeLoader {
	opener: Arc<dyn ModuleOpener>,
	state: Mutex<NativeState>,
}

pub fn is_dynamic_lib(path: &Path) -> bool {
	matches!(path.extension().and_then(OsStr::to_str), Some("so" | "dylib" | "dll"))
}

fn stamp_of(path: &Path) -> Result<ModuleStamp> {
	let meta = std::fs::metadata(path).map_err(|source| ComponentError::Io {
		path: path.to_path_buf(),
		source,
	})?;
	let modified_ms = meta
		.modified()
		.ok()
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
	Ok(ModuleStamp {
		modified_ms,
		size: i64::try_from(meta.len()).unwrap_or(i64::MAX),
	})
}

fn collect_modules(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
	let entries = std::fs::read_dir(dir).map_err(|source| ComponentError::Io {
		path: dir.to_path_buf(),
		source,
	})?;
	for entry in entries.flatten() {
		let path = entry.path();
		let Ok(file_type) = entry.file_type() else {
			continue;
		};
		if file_type.is_dir() {
			collect_modules(&path, out)?;
		} else if is_dynamic_lib(&path) {
			out.push(path);
		}
	}
	Ok(())
}

impl NativeLoader {
	pub fn new(opener: Arc<dyn ModuleOpener>) -> Self {
		Self {
			opener,
			state: Mutex::new(NativeState::default()),
		}
	}

	/// Returns the module at `location`, opening it if needed.
	///
	/// Opening runs the module entry point under the loader lock, so one
	/// location is never initialized twice.
	fn module(&self, path: &Path, location: &Location) -> Result<Arc<NativeModule>> {
		let mut state = self.state.lock();
		let key = location.to_string();
		if let Some(module) = state.modules.get(&key) {
			return Ok(module.clone());
		}
		let opened = self.opener.open(path)?;
		let module = Arc::new(NativeModule::load(opened, location.clone())?);
		state.modules.insert(key, module.clone());
		Ok(module)
	}

	/// Drops the cached module at `location` so it is reopened from disk.
	///
	/// Returns `false` when the module is still in use: something outside the
	/// cache holds it and it does not agree to unload.
	fn evict_changed(&self, location: &Location) -> bool {
		let mut state = self.state.lock();
		state.deferred.retain(|d| d.module.location() != location);
		let key = location.to_string();
		let Some(module) = state.modules.get(&key) else {
			return true;
		};
		if Arc::strong_count(module) > 1 && !module.can_unload() {
			return false;
		}
		let stale = state.modules.remove(&key);
		drop(state);
		debug!(location = %location, "unloading changed native module");
		drop(stale);
		true
	}

	fn requirements_met(manager: &ComponentManager, module: &NativeModule) -> bool {
		module.requires().iter().all(|cid| manager.is_registered(cid))
	}

	/// Registers every component of `module` and records its file stamp.
	fn register_module(&self, manager: &ComponentManager, module: &NativeModule, stamp: ModuleStamp) -> Result<()> {
		let location = module.location();
		for component in module.components() {
			manager.register_component_with_kind(
				&component.cid,
				component.class_name.as_deref(),
				component.contract_id.as_ref().map(|c| c.as_str()),
				location,
				NATIVE_KIND,
				true,
				true,
			)?;
		}
		manager.records().record_module(location, stamp)?;
		info!(location = %location, components = module.components().len(), "native module registered");
		Ok(())
	}

	fn defer(&self, path: &Path, stamp: ModuleStamp, module: Arc<NativeModule>) {
		let mut state = self.state.lock();
		let location = module.location().clone();
		state.deferred.retain(|d| *d.module.location() != location);
		debug!(location = %location, "native module deferred on missing dependencies");
		state.deferred.push(DeferredModule {
			path: path.to_path_buf(),
			stamp,
			module,
		});
	}
}

impl Loader for NativeLoader {
	fn kind(&self) -> &str {
		NATIVE_KIND
	}

	fn materialize(&self, manager: &ComponentManager, descriptor: &ModuleDescriptor, cid: &Cid) -> Result<Arc<dyn Factory>> {
		let path = descriptor.location.resolve(&manager.components_dir());
		let module = self.module(&path, &descriptor.location)?;
		if !module.exports(cid) {
			return Err(ComponentError::not_registered(cid));
		}
		Ok(Arc::new(NativeFactory::new(module, *cid)))
	}

	fn auto_register_all(&self, manager: &ComponentManager, when: When, directory: &Path) -> Result<usize> {
		if !directory.is_dir() {
			debug!(dir = %directory.display(), "components directory absent");
			return Ok(0);
		}
		let mut paths = Vec::new();
		collect_modules(directory, &mut paths)?;
		paths.sort();

		let mut registered = 0;
		for path in paths {
			match self.auto_register_one(manager, when, &path) {
				Ok(true) => registered += 1,
				Ok(false) => {}
				Err(e @ (ComponentError::ModuleLoadFailed { .. } | ComponentError::EntryPointMissing { .. })) => {
					warn!(path = %path.display(), error = %e, "skipping native module");
				}
				Err(e) => return Err(e),
			}
		}
		Ok(registered)
	}

	fn auto_register_one(&self, manager: &ComponentManager, _when: When, module_path: &Path) -> Result<bool> {
		if !is_dynamic_lib(module_path) {
			return Ok(false);
		}
		let location = manager.location_for_path(module_path);
		let stamp = stamp_of(module_path)?;
		let recorded = manager.records().module_stamp(&location)?;
		if recorded == Some(stamp) {
			debug!(location = %location, "native module unchanged");
			return Ok(false);
		}
		// The stamp stays stale until the old image is gone, so a later sweep retries.
		if recorded.is_some() && !self.evict_changed(&location) {
			warn!(location = %location, "changed native module is still in use");
			return Ok(false);
		}

		let module = self.module(module_path, &location)?;
		if !Self::requirements_met(manager, &module) {
			self.defer(module_path, stamp, module);
			return Ok(false);
		}
		self.register_module(manager, &module, stamp)?;
		self.state.lock().deferred.retain(|d| *d.module.location() != location);
		Ok(true)
	}

	fn auto_unregister_one(&self, manager: &ComponentManager, _when: When, module_path: &Path) -> Result<bool> {
		if !is_dynamic_lib(module_path) {
			return Ok(false);
		}
		let location = manager.location_for_path(module_path);
		// A module that no longer opens is unregistered from its records.
		let cids: Vec<Cid> = match self.module(module_path, &location) {
			Ok(module) => module.components().iter().map(|c| c.cid).collect(),
			Err(e) => {
				debug!(location = %location, error = %e, "unregistering unopenable module from records");
				let mut cids = Vec::new();
				for cid in manager.records().class_ids()? {
					if manager.records().read_class(&cid)?.is_some_and(|c| c.location.eq_ignore_case(&location)) {
						cids.push(cid);
					}
				}
				cids
			}
		};

		let mut unregistered = false;
		for cid in &cids {
			match manager.unregister_component(cid, &location) {
				Ok(()) => unregistered = true,
				Err(ComponentError::FactoryNotRegistered(_)) => {}
				Err(e) => return Err(e),
			}
		}
		let forgotten = manager.records().forget_module(&location)?;

		let released = {
			let mut state = self.state.lock();
			state.deferred.retain(|d| *d.module.location() != location);
			state.modules.remove(&location.to_string())
		};
		drop(released);

		if unregistered || forgotten {
			info!(location = %location, "native module unregistered");
		}
		Ok(unregistered || forgotten)
	}

	fn register_deferred(&self, manager: &ComponentManager, _when: When) -> Result<bool> {
		let pending: Vec<(PathBuf, ModuleStamp, Arc<NativeModule>)> = self
			.state
			.lock()
			.deferred
			.iter()
			.map(|d| (d.path.clone(), d.stamp, d.module.clone()))
			.collect();

		let mut progress = false;
		for (path, stamp, module) in pending {
			if !Self::requirements_met(manager, &module) {
				continue;
			}
			self.register_module(manager, &module, stamp)?;
			self.state.lock().deferred.retain(|d| d.path != path);
			progress = true;
		}
		Ok(progress)
	}

	fn deferred_count(&self) -> usize {
		self.state.lock().deferred.len()
	}

	fn release_all(&self, when: When) -> Result<()> {
		let released: Vec<Arc<NativeModule>> = {
			let mut state = self.state.lock();
			if when.is_mandatory() {
				state.deferred.clear();
				state.modules.drain().map(|(_, m)| m).collect()
			} else {
				let keys: Vec<String> = state
					.modules
					.iter()
					.filter(|(_, m)| m.can_unload())
					.map(|(k, _)| k.clone())
					.collect();
				keys.iter().filter_map(|k| state.modules.remove(k)).collect()
			}
		};
		if !released.is_empty() {
			debug!(count = released.len(), %when, "releasing native modules");
		}
		drop(released);
		Ok(())
	}
}
