//! Loader capability.
//!
//! A [`Loader`] understands one module kind: it turns a [`ModuleDescriptor`]
//! into a live factory, discovers modules of its kind during autoregistration
//! and releases what it holds at unload time. Every call receives the manager
//! so a loader can register components or create instances without owning a
//! reference to it.
//!
//! The manager never holds its lock across a loader call, so loaders are free
//! to re-enter it.

mod category;

use std::path::Path;
use std::sync::Arc;

pub use category::{LoaderCtor, LoaderProviderDef};
pub(crate) use category::LoaderCategory;
use comreg_primitives::{Cid, ContractId, When};

use crate::entry::ModuleDescriptor;
use crate::error::Result;
use crate::factory::Factory;
use crate::manager::ComponentManager;

/// A component registration handed to [`Loader::on_registered`].
#[derive(Clone, Debug)]
pub struct Registration {
	pub cid: Cid,
	pub class_name: Option<String>,
	pub contract_id: Option<ContractId>,
	pub descriptor: ModuleDescriptor,
}

pub trait Loader: Send + Sync {
	/// Module kind served, e.g. `application/x-comreg-native`.
	fn kind(&self) -> &str;

	/// Called once when the manager first acquires the loader.
	fn init(&self, _manager: &ComponentManager) -> Result<()> {
		Ok(())
	}

	/// Loads the module behind `descriptor` if needed and returns a factory for `cid`.
	fn materialize(&self, manager: &ComponentManager, descriptor: &ModuleDescriptor, cid: &Cid) -> Result<Arc<dyn Factory>>;

	/// Post-commit hook for a registration of this loader's kind. An error
	/// rolls the registration back.
	fn on_registered(&self, _manager: &ComponentManager, _registration: &Registration) -> Result<()> {
		Ok(())
	}

	/// Scans `directory` and registers new or changed modules. Returns how many registered.
	fn auto_register_all(&self, _manager: &ComponentManager, _when: When, _directory: &Path) -> Result<usize> {
		Ok(0)
	}

	/// Registers a single module. `Ok(false)` when the module is not of this
	/// kind, unchanged, or deferred.
	fn auto_register_one(&self, _manager: &ComponentManager, _when: When, _module: &Path) -> Result<bool> {
		Ok(false)
	}

	fn auto_unregister_one(&self, _manager: &ComponentManager, _when: When, _module: &Path) -> Result<bool> {
		Ok(false)
	}

	/// Retries modules deferred on missing dependencies. Returns whether anything registered.
	fn register_deferred(&self, _manager: &ComponentManager, _when: When) -> Result<bool> {
		Ok(false)
	}

	/// Modules still waiting on dependencies.
	fn deferred_count(&self) -> usize {
		0
	}

	/// Releases held modules. [`When::Timer`] only drops modules that agree
	/// to unload; [`When::Shutdown`] drops everything.
	fn release_all(&self, _when: When) -> Result<()> {
		Ok(())
	}
}
