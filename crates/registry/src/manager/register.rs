use std::path::Path;
use std::sync::Arc;

use comreg_primitives::{Cid, ContractId};
use tracing::{debug, info, warn};

use super::ComponentManager;
use crate::entry::{ContractSlot, FactoryEntry, ModuleDescriptor};
use crate::error::{ComponentError, Result};
use crate::factory::Factory;
use crate::loader::Registration;
use crate::location::Location;
use crate::native::NATIVE_KIND;
use crate::records::StoredClass;

fn non_empty(name: Option<&str>) -> Option<String> {
	name.filter(|s| !s.is_empty()).map(str::to_string)
}

impl ComponentManager {
	/// Binds `cid` to a factory supplied by the caller. Nothing is persisted.
	///
	/// # Errors
	///
	/// [`ComponentError::FactoryExists`] if `cid` already has an in-memory
	/// entry and `replace` is false; the existing entry is left untouched.
	pub fn register_factory(
		&self,
		cid: &Cid,
		class_name: Option<&str>,
		contract_id: Option<&str>,
		factory: Arc<dyn Factory>,
		replace: bool,
	) -> Result<()> {
		self.ensure_not_shut_down("register_factory during shutdown")?;
		if cid.is_null() {
			return Err(ComponentError::NullArgument);
		}
		let contract = ContractId::non_empty(contract_id);
		let entry = Arc::new(FactoryEntry::live(*cid, non_empty(class_name), contract.clone(), factory));

		let mut state = self.state.lock();
		if !replace && state.factories.contains_key(cid) {
			return Err(ComponentError::FactoryExists(*cid));
		}
		state.factories.insert(*cid, entry);
		if let Some(contract) = contract {
			state.contracts.insert(contract, ContractSlot::Mapped(*cid));
		}
		drop(state);
		debug!(cid = %cid, "factory registered");
		Ok(())
	}

	/// Registers a native component at `location`.
	pub fn register_component(
		&self,
		cid: &Cid,
		class_name: Option<&str>,
		contract_id: Option<&str>,
		location: &Location,
		replace: bool,
		persist: bool,
	) -> Result<()> {
		self.register_component_with_kind(cid, class_name, contract_id, location, NATIVE_KIND, replace, persist)
	}

	/// Registers a native component from a filesystem path (`rel:` inside the
	/// components directory, `abs:` elsewhere).
	pub fn register_component_path(
		&self,
		cid: &Cid,
		class_name: Option<&str>,
		contract_id: Option<&str>,
		path: &Path,
		replace: bool,
		persist: bool,
	) -> Result<()> {
		let location = self.location_for_path(path);
		self.register_component(cid, class_name, contract_id, &location, replace, persist)
	}

	/// Registers a native component found through the platform library search path.
	pub fn register_component_lib(
		&self,
		cid: &Cid,
		class_name: Option<&str>,
		contract_id: Option<&str>,
		lib_name: &str,
		replace: bool,
		persist: bool,
	) -> Result<()> {
		if lib_name.is_empty() {
			return Err(ComponentError::NullArgument);
		}
		self.register_component(cid, class_name, contract_id, &Location::Lib(lib_name.to_string()), replace, persist)
	}

	/// Registers a component whose factory the loader for `kind` materializes on demand.
	///
	/// With `persist`, the store is written first and a store failure aborts
	/// before anything changes in memory. The store is not rolled back if a
	/// later step fails. A failing [`Loader::on_registered`](crate::Loader::on_registered)
	/// hook restores the previous in-memory entry and contract mapping.
	#[allow(clippy::too_many_arguments)]
	pub fn register_component_with_kind(
		&self,
		cid: &Cid,
		class_name: Option<&str>,
		contract_id: Option<&str>,
		location: &Location,
		kind: &str,
		replace: bool,
		persist: bool,
	) -> Result<()> {
		self.ensure_not_shut_down("register_component during shutdown")?;
		if cid.is_null() || kind.is_empty() {
			return Err(ComponentError::NullArgument);
		}
		if !replace && self.find_factory_entry(cid, true).is_some() {
			return Err(ComponentError::FactoryExists(*cid));
		}

		let class_name = non_empty(class_name);
		let contract = ContractId::non_empty(contract_id);
		let descriptor = ModuleDescriptor {
			location: location.clone(),
			kind: kind.to_string(),
		};

		if persist {
			self.records.write_class(
				cid,
				&StoredClass {
					class_name: class_name.clone(),
					contract_id: contract.clone(),
					location: location.clone(),
					kind: kind.to_string(),
				},
			)?;
		}

		let loader = self.loader_for_kind(kind)?;
		let entry = Arc::new(FactoryEntry::deferred(
			*cid,
			class_name.clone(),
			contract.clone(),
			descriptor.clone(),
			Some(loader.clone()),
		));

		let (previous_entry, previous_slot) = {
			let mut state = self.state.lock();
			if !replace && state.factories.contains_key(cid) {
				return Err(ComponentError::FactoryExists(*cid));
			}
			let previous_entry = state.factories.insert(*cid, entry.clone());
			let previous_slot = contract
				.as_ref()
				.map(|c| state.contracts.insert(c.clone(), ContractSlot::Mapped(*cid)));
			(previous_entry, previous_slot)
		};

		let registration = Registration {
			cid: *cid,
			class_name,
			contract_id: contract.clone(),
			descriptor,
		};
		if let Err(e) = loader.on_registered(self, &registration) {
			warn!(cid = %cid, kind, error = %e, "registration hook failed, rolling back");
			let mut state = self.state.lock();
			if state.factories.get(cid).is_some_and(|current| Arc::ptr_eq(current, &entry)) {
				match previous_entry {
					Some(previous) => state.factories.insert(*cid, previous),
					None => state.factories.remove(cid),
				};
			}
			if let (Some(contract), Some(previous_slot)) = (contract, previous_slot)
				&& state.contracts.get(&contract) == Some(&ContractSlot::Mapped(*cid))
			{
				match previous_slot {
					Some(slot) => state.contracts.insert(contract, slot),
					None => state.contracts.remove(&contract),
				};
			}
			return Err(e);
		}

		info!(cid = %cid, kind, location = %location, persist, "component registered");
		Ok(())
	}

	/// Removes the entry for `cid` if it holds exactly `factory`.
	///
	/// The contract id map is left alone; stale mappings miss on their next use.
	pub fn unregister_factory(&self, cid: &Cid, factory: &Arc<dyn Factory>) -> Result<()> {
		let mut state = self.state.lock();
		match state.factories.get(cid) {
			Some(entry) if entry.holds(factory) => {
				state.factories.remove(cid);
				drop(state);
				debug!(cid = %cid, "factory unregistered");
				Ok(())
			}
			_ => Err(ComponentError::not_registered(cid)),
		}
	}

	/// Forgets the registration of `cid` at `location` in memory and in the store.
	///
	/// Both steps run in one locked section. A store failure is returned even
	/// if the in-memory entry was removed.
	pub fn unregister_component(&self, cid: &Cid, location: &Location) -> Result<()> {
		let mut state = self.state.lock();
		let in_memory = state
			.factories
			.get(cid)
			.and_then(|entry| entry.location())
			.is_some_and(|loc| loc.eq_ignore_case(location));
		if in_memory {
			state.factories.remove(cid);
		}
		let in_store = self.records.forget_class(cid, location);
		drop(state);

		match in_store {
			Err(e) => Err(e),
			Ok(in_store) if in_memory || in_store => {
				info!(cid = %cid, location = %location, "component unregistered");
				Ok(())
			}
			Ok(_) => Err(ComponentError::not_registered(cid)),
		}
	}

	pub fn unregister_component_path(&self, cid: &Cid, path: &Path) -> Result<()> {
		let location = self.location_for_path(path);
		self.unregister_component(cid, &location)
	}
}
