//! The component manager.
//!
//! # Concurrency
//!
//! The CID map, the contract id map and the loader cache live in one
//! [`RegistryState`] behind a single mutex. The lock is held only for map
//! operations and is never held across a call into a [`Loader`] or a
//! [`Factory`](crate::Factory), so both may re-enter the manager. Entries
//! populated from the store race on insert-if-absent: the first entry in the
//! map wins and the loser's is dropped.
//!
//! The lifecycle is an atomic read without the lock. Instance creation checks
//! it before resolving, after taking the lock, and again right before calling
//! the factory, so nothing is constructed once shutdown has begun.

mod autoreg;
mod enumeration;
mod lookup;
mod register;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

pub use autoreg::AutoRegisterSummary;
use comreg_primitives::{Cid, ContractId, When};
use comreg_store::{MemoryStore, Store};
pub use enumeration::Enumeration;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::entry::{ContractSlot, FactoryEntry};
use crate::error::{ComponentError, Result};
use crate::loader::{Loader, LoaderCategory};
use crate::location::Location;
use crate::native::{DylibOpener, ModuleOpener, NATIVE_KIND, NativeLoader};
use crate::records::ComponentRecords;

/// Manager lifecycle. Transitions only move forward.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Lifecycle {
	NotStarted = 0,
	Running = 1,
	ShuttingDown = 2,
	ShutdownComplete = 3,
}

impl Lifecycle {
	fn from_u8(value: u8) -> Self {
		match value {
			0 => Lifecycle::NotStarted,
			1 => Lifecycle::Running,
			2 => Lifecycle::ShuttingDown,
			_ => Lifecycle::ShutdownComplete,
		}
	}
}

#[derive(Default)]
struct RegistryState {
	factories: HashMap<Cid, Arc<FactoryEntry>>,
	contracts: HashMap<ContractId, ContractSlot>,
	loaders: BTreeMap<String, Arc<dyn Loader>>,
}

/// Maps CIDs and contract ids to factories and governs their lifecycle.
pub struct ComponentManager {
	config: RwLock<ManagerConfig>,
	records: ComponentRecords,
	state: Mutex<RegistryState>,
	category: LoaderCategory,
	native: Arc<NativeLoader>,
	lifecycle: AtomicU8,
	prepopulated: AtomicBool,
	prepopulate_gate: Mutex<()>,
}

impl ComponentManager {
	/// A manager whose native loader opens modules as dynamic libraries.
	pub fn new(store: Arc<dyn Store>, config: ManagerConfig) -> Self {
		Self::with_opener(store, config, Arc::new(DylibOpener))
	}

	/// A manager whose native loader opens modules through `opener`.
	pub fn with_opener(store: Arc<dyn Store>, config: ManagerConfig, opener: Arc<dyn ModuleOpener>) -> Self {
		let native = Arc::new(NativeLoader::new(opener));
		let mut state = RegistryState::default();
		state.loaders.insert(NATIVE_KIND.to_string(), native.clone() as Arc<dyn Loader>);
		Self {
			config: RwLock::new(config),
			records: ComponentRecords::new(store),
			state: Mutex::new(state),
			category: LoaderCategory::default(),
			native,
			lifecycle: AtomicU8::new(Lifecycle::NotStarted as u8),
			prepopulated: AtomicBool::new(false),
			prepopulate_gate: Mutex::new(()),
		}
	}

	/// A manager over a fresh [`MemoryStore`] with default configuration.
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryStore::new()), ManagerConfig::default())
	}

	pub fn lifecycle(&self) -> Lifecycle {
		Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
	}

	/// Validates the store layout and starts the manager.
	///
	/// # Errors
	///
	/// [`ComponentError::Unexpected`] when called more than once.
	pub fn init(&self) -> Result<()> {
		if self.lifecycle() != Lifecycle::NotStarted {
			return Err(ComponentError::Unexpected("init called twice"));
		}
		self.records.check_layout()?;
		self.native.init(self)?;
		self.lifecycle
			.compare_exchange(
				Lifecycle::NotStarted as u8,
				Lifecycle::Running as u8,
				Ordering::AcqRel,
				Ordering::Acquire,
			)
			.map_err(|_| ComponentError::Unexpected("init called twice"))?;
		info!(components_dir = %self.components_dir().display(), "component manager started");

		if self.config.read().prepopulate_on_init {
			self.ensure_prepopulated()?;
		}
		Ok(())
	}

	/// Tears the manager down.
	///
	/// The maps are cleared under the lock, then every loader releases its
	/// modules outside it, sorted by kind with the native loader last. The
	/// store is flushed at the end. Failures are logged and the first one is
	/// returned once shutdown has completed.
	pub fn shutdown(&self) -> Result<()> {
		self.lifecycle
			.compare_exchange(
				Lifecycle::Running as u8,
				Lifecycle::ShuttingDown as u8,
				Ordering::AcqRel,
				Ordering::Acquire,
			)
			.map_err(|_| ComponentError::Unexpected("shutdown called on a manager that is not running"))?;
		info!("component manager shutting down");

		let loaders = {
			let mut state = self.state.lock();
			state.factories.clear();
			state.contracts.clear();
			std::mem::take(&mut state.loaders)
		};

		let mut first_error = None;
		for loader in ordered_native_last(loaders) {
			if let Err(e) = loader.release_all(When::Shutdown) {
				error!(kind = loader.kind(), error = %e, "loader failed to release modules");
				first_error.get_or_insert(e);
			}
		}
		if let Err(e) = self.records.flush() {
			error!(error = %e, "failed to flush registration store");
			first_error.get_or_insert(e);
		}

		self.lifecycle.store(Lifecycle::ShutdownComplete as u8, Ordering::Release);
		info!("component manager shut down");
		first_error.map_or(Ok(()), Err)
	}

	pub fn config(&self) -> ManagerConfig {
		self.config.read().clone()
	}

	/// Directory swept by autoregistration and base of `rel:` locations.
	pub fn components_dir(&self) -> PathBuf {
		self.config.read().components_dir.clone()
	}

	/// Encodes `path` as a location relative to the components directory when possible.
	pub fn location_for_path(&self, path: &Path) -> Location {
		Location::from_path(path, &self.config.read().components_dir)
	}

	/// The persistent registration records.
	pub fn records(&self) -> &ComponentRecords {
		&self.records
	}

	/// Adds a runtime provider for `kind` to the loader category.
	///
	/// Already instantiated loaders are unaffected.
	pub fn register_loader_provider<F>(&self, kind: &str, ctor: F) -> Result<()>
	where
		F: Fn() -> Arc<dyn Loader> + Send + Sync + 'static,
	{
		if kind.is_empty() {
			return Err(ComponentError::NullArgument);
		}
		if kind == NATIVE_KIND {
			return Err(ComponentError::Unexpected("the native loader cannot be replaced"));
		}
		self.category.register(kind, Arc::new(ctor));
		debug!(kind, "loader provider registered");
		Ok(())
	}

	/// Returns the loader for `kind`, instantiating and initializing it on first use.
	pub fn loader_for_kind(&self, kind: &str) -> Result<Arc<dyn Loader>> {
		if self.is_shutting_down() {
			return Err(ComponentError::Unexpected("loader requested during shutdown"));
		}
		if let Some(loader) = self.state.lock().loaders.get(kind) {
			return Ok(loader.clone());
		}

		let ctor = self
			.category
			.provider(kind)
			.ok_or_else(|| ComponentError::LoaderNotFound(kind.to_string()))?;
		let loader = ctor();
		loader.init(self)?;

		let mut state = self.state.lock();
		if self.is_shutting_down() {
			return Err(ComponentError::Unexpected("loader requested during shutdown"));
		}
		let loader = state.loaders.entry(kind.to_string()).or_insert(loader).clone();
		debug!(kind, "loader instantiated");
		Ok(loader)
	}

	/// Instantiated loaders other than the native one, sorted by kind.
	fn other_loaders(&self) -> Vec<Arc<dyn Loader>> {
		self.state
			.lock()
			.loaders
			.iter()
			.filter(|(kind, _)| kind.as_str() != NATIVE_KIND)
			.map(|(_, loader)| loader.clone())
			.collect()
	}

	fn is_shutting_down(&self) -> bool {
		self.lifecycle() >= Lifecycle::ShuttingDown
	}

	fn ensure_running(&self, op: &'static str) -> Result<()> {
		match self.lifecycle() {
			Lifecycle::Running => Ok(()),
			_ => Err(ComponentError::Unexpected(op)),
		}
	}

	fn ensure_not_shut_down(&self, op: &'static str) -> Result<()> {
		if self.is_shutting_down() {
			return Err(ComponentError::Unexpected(op));
		}
		Ok(())
	}

	/// Releases modules that agree to unload early.
	pub fn free_libraries(&self) -> Result<()> {
		self.ensure_not_shut_down("free_libraries during shutdown")?;
		let mut first_error = None;
		let mut loaders = self.other_loaders();
		loaders.push(self.native.clone());
		for loader in loaders {
			if let Err(e) = loader.release_all(When::Timer) {
				warn!(kind = loader.kind(), error = %e, "loader failed to release modules");
				first_error.get_or_insert(e);
			}
		}
		first_error.map_or(Ok(()), Err)
	}
}

fn ordered_native_last(loaders: BTreeMap<String, Arc<dyn Loader>>) -> Vec<Arc<dyn Loader>> {
	let (native, mut others): (Vec<_>, Vec<_>) = loaders.into_iter().partition(|(kind, _)| kind == NATIVE_KIND);
	others.extend(native);
	others.into_iter().map(|(_, loader)| loader).collect()
}

impl Drop for ComponentManager {
	fn drop(&mut self) {
		if self.lifecycle() == Lifecycle::Running
			&& let Err(e) = self.shutdown()
		{
			warn!(error = %e, "shutdown on drop failed");
		}
	}
}
