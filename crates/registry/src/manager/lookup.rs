use std::sync::Arc;

use comreg_primitives::{Cid, ContractId, Iid};
use tracing::{debug, warn};

use super::ComponentManager;
use crate::entry::{ContractSlot, FactoryEntry, ModuleDescriptor};
use crate::error::{ComponentError, Result};
use crate::factory::{ClassInfo, Factory, Object};

impl ComponentManager {
	/// Looks up the entry for `cid`, importing it from the store on a miss
	/// when `populate_from_store` is set. Absence is not an error.
	pub fn find_factory_entry(&self, cid: &Cid, populate_from_store: bool) -> Option<Arc<FactoryEntry>> {
		{
			let state = self.state.lock();
			if self.is_shutting_down() {
				return None;
			}
			if let Some(entry) = state.factories.get(cid) {
				return Some(entry.clone());
			}
		}
		if !populate_from_store {
			return None;
		}

		let stored = match self.records.read_class(cid) {
			Ok(Some(stored)) => stored,
			Ok(None) => return None,
			Err(e) => {
				warn!(cid = %cid, error = %e, "failed to read class record");
				return None;
			}
		};
		let entry = Arc::new(FactoryEntry::deferred(
			*cid,
			stored.class_name,
			stored.contract_id,
			ModuleDescriptor {
				location: stored.location,
				kind: stored.kind,
			},
			None,
		));

		let mut state = self.state.lock();
		if self.is_shutting_down() {
			return None;
		}
		debug!(cid = %cid, "entry populated from store");
		Some(state.factories.entry(*cid).or_insert(entry).clone())
	}

	/// Resolves a contract id to its CID, consulting the store on the first
	/// miss and remembering a negative answer.
	pub fn contract_id_to_cid(&self, contract: &str) -> Result<Cid> {
		if contract.is_empty() {
			return Err(ComponentError::NullArgument);
		}
		let cached = self.state.lock().contracts.get(contract).copied();
		let slot = match cached {
			Some(slot) => slot,
			None => {
				let looked_up = match self.records.read_contract(contract)? {
					Some(cid) => ContractSlot::Mapped(cid),
					None => ContractSlot::Missing,
				};
				*self
					.state
					.lock()
					.contracts
					.entry(ContractId::from(contract))
					.or_insert(looked_up)
			}
		};
		match slot {
			ContractSlot::Mapped(cid) => Ok(cid),
			ContractSlot::Missing => Err(ComponentError::not_registered(contract)),
		}
	}

	/// Class name and contract id recorded for `cid`.
	///
	/// Read from the store, falling back to the in-memory entry for
	/// registrations that were never persisted.
	pub fn cid_to_contract_id(&self, cid: &Cid) -> Result<ClassInfo> {
		if let Some(stored) = self.records.read_class(cid)? {
			return Ok(ClassInfo {
				cid: *cid,
				class_name: stored.class_name,
				contract_id: stored.contract_id,
			});
		}
		let entry = self
			.find_factory_entry(cid, false)
			.ok_or_else(|| ComponentError::not_registered(cid))?;
		Ok(ClassInfo {
			cid: *cid,
			class_name: entry.class_name.clone(),
			contract_id: entry.contract_id.clone(),
		})
	}

	fn resolve(&self, cid: &Cid, op: &'static str) -> Result<Arc<dyn Factory>> {
		self.ensure_running(op)?;
		let entry = self.find_factory_entry(cid, true);
		self.ensure_running(op)?;
		let entry = entry.ok_or_else(|| ComponentError::not_registered(cid))?;
		entry.resolve_factory(self).map_err(|e| {
			warn!(cid = %cid, error = %e, "failed to materialize factory");
			ComponentError::not_registered(cid)
		})
	}

	/// Creates an instance of `cid` exposing `iid`.
	///
	/// # Errors
	///
	/// - [`ComponentError::Unexpected`] unless the manager is running.
	/// - [`ComponentError::FactoryNotRegistered`] when no factory can be resolved.
	/// - Otherwise whatever the factory returns.
	pub fn create_instance(&self, cid: &Cid, outer: Option<&Object>, iid: &Iid) -> Result<Object> {
		let factory = self.resolve(cid, "create_instance outside the running state")?;
		self.ensure_running("create_instance outside the running state")?;
		factory.create_instance(outer, iid)
	}

	pub fn create_instance_by_contract_id(&self, contract: &str, outer: Option<&Object>, iid: &Iid) -> Result<Object> {
		self.ensure_running("create_instance outside the running state")?;
		let cid = self.contract_id_to_cid(contract)?;
		self.create_instance(&cid, outer, iid)
	}

	/// Returns the factory of `cid` viewed as `iid`.
	///
	/// [`Iid::FACTORY`] and [`Iid::SUPPORTS`] yield the factory itself, as an
	/// `Arc<dyn Factory>` inside the [`Object`] (see [`as_factory`](crate::as_factory)).
	/// Other interfaces are asked of [`Factory::query_interface`].
	pub fn get_class_object(&self, cid: &Cid, iid: &Iid) -> Result<Object> {
		let factory = self.resolve(cid, "get_class_object outside the running state")?;
		if *iid == Iid::FACTORY || *iid == Iid::SUPPORTS {
			return Ok(Arc::new(factory));
		}
		factory.query_interface(iid).ok_or(ComponentError::NoInterface(*iid))
	}

	pub fn get_class_object_by_contract_id(&self, contract: &str, iid: &Iid) -> Result<Object> {
		self.ensure_running("get_class_object outside the running state")?;
		let cid = self.contract_id_to_cid(contract)?;
		self.get_class_object(&cid, iid)
	}

	/// Whether `cid` has an entry in memory or a record in the store.
	pub fn is_registered(&self, cid: &Cid) -> bool {
		self.find_factory_entry(cid, true).is_some()
	}
}
