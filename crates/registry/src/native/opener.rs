use std::collections::HashMap;
use std::path::Path;

use comreg_cabi::{COMREG_MODULE_ENTRY_V1, ComregModuleEntryV1};
use libloading::Library;

use crate::error::{ComponentError, Result};

/// An opened module: its entry point and the library keeping it mapped.
pub struct OpenedModule {
	pub(crate) entry: ComregModuleEntryV1,
	pub(crate) library: Option<Library>,
}

impl OpenedModule {
	/// A module linked into the current binary.
	pub fn linked(entry: ComregModuleEntryV1) -> Self {
		Self { entry, library: None }
	}
}

/// Maps a module file to its entry point.
pub trait ModuleOpener: Send + Sync {
	fn open(&self, path: &Path) -> Result<OpenedModule>;
}

/// Opens modules as dynamic libraries.
#[derive(Debug, Default)]
pub struct DylibOpener;

impl ModuleOpener for DylibOpener {
	fn open(&self, path: &Path) -> Result<OpenedModule> {
		let location = path.display();
		// SAFETY: loading a library runs its initializers; component modules
		// are trusted code by contract.
		let library = unsafe { Library::new(path) }.map_err(|e| ComponentError::load_failed(&location, e))?;
		let entry = {
			// SAFETY: the symbol type is fixed by the module ABI.
			let symbol = unsafe { library.get::<ComregModuleEntryV1>(COMREG_MODULE_ENTRY_V1) }.map_err(|_| ComponentError::EntryPointMissing {
				location: location.to_string(),
				symbol: "comreg_module_entry_v1".to_string(),
			})?;
			*symbol
		};
		Ok(OpenedModule {
			entry,
			library: Some(library),
		})
	}
}

/// Resolves module files by name to entry points linked into the binary,
/// falling back to [`DylibOpener`] for names it does not know.
#[derive(Default)]
pub struct StaticModuleTable {
	modules: HashMap<String, ComregModuleEntryV1>,
	fallback: DylibOpener,
}

impl StaticModuleTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Serves `file_name` (e.g. `libwidget.so`) from `entry`.
	pub fn with_module(mut self, file_name: impl Into<String>, entry: ComregModuleEntryV1) -> Self {
		self.modules.insert(file_name.into(), entry);
		self
	}
}

impl ModuleOpener for StaticModuleTable {
	fn open(&self, path: &Path) -> Result<OpenedModule> {
		let linked = path
			.file_name()
			.and_then(|name| name.to_str())
			.and_then(|name| self.modules.get(name));
		match linked {
			Some(entry) => Ok(OpenedModule::linked(*entry)),
			None => self.fallback.open(path),
		}
	}
}
