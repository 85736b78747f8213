use std::fmt;
use std::sync::Arc;

use comreg_primitives::{Cid, ContractId};

use crate::error::Result;
use crate::factory::{Factory, same_factory};
use crate::loader::Loader;
use crate::location::Location;
use crate::manager::ComponentManager;

/// Where a deferred component's code lives and which loader kind understands it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModuleDescriptor {
	pub location: Location,
	pub kind: String,
}

/// How an entry obtains its factory.
#[derive(Clone)]
pub enum FactorySource {
	/// Supplied directly by the registrant.
	Live(Arc<dyn Factory>),
	/// Materialized on demand by the loader for `descriptor.kind`. The loader is
	/// looked up on first use when the entry came from the store.
	Deferred {
		descriptor: ModuleDescriptor,
		loader: Option<Arc<dyn Loader>>,
	},
}

/// Binding of one CID to the means of constructing it.
#[derive(Clone)]
pub struct FactoryEntry {
	pub cid: Cid,
	pub class_name: Option<String>,
	pub contract_id: Option<ContractId>,
	pub source: FactorySource,
}

impl FactoryEntry {
	pub fn live(cid: Cid, class_name: Option<String>, contract_id: Option<ContractId>, factory: Arc<dyn Factory>) -> Self {
		Self {
			cid,
			class_name,
			contract_id,
			source: FactorySource::Live(factory),
		}
	}

	pub fn deferred(
		cid: Cid,
		class_name: Option<String>,
		contract_id: Option<ContractId>,
		descriptor: ModuleDescriptor,
		loader: Option<Arc<dyn Loader>>,
	) -> Self {
		Self {
			cid,
			class_name,
			contract_id,
			source: FactorySource::Deferred { descriptor, loader },
		}
	}

	pub fn location(&self) -> Option<&Location> {
		match &self.source {
			FactorySource::Live(_) => None,
			FactorySource::Deferred { descriptor, .. } => Some(&descriptor.location),
		}
	}

	pub fn descriptor(&self) -> Option<&ModuleDescriptor> {
		match &self.source {
			FactorySource::Live(_) => None,
			FactorySource::Deferred { descriptor, .. } => Some(descriptor),
		}
	}

	/// Whether the entry holds exactly `factory` (pointer identity).
	pub fn holds(&self, factory: &Arc<dyn Factory>) -> bool {
		matches!(&self.source, FactorySource::Live(f) if same_factory(f, factory))
	}

	/// Returns a factory for this entry, asking the loader when the entry is
	/// deferred. Nothing is cached: modules may be unloaded between calls.
	pub fn resolve_factory(&self, manager: &ComponentManager) -> Result<Arc<dyn Factory>> {
		match &self.source {
			FactorySource::Live(factory) => Ok(factory.clone()),
			FactorySource::Deferred { descriptor, loader } => {
				let loader = match loader {
					Some(loader) => loader.clone(),
					None => manager.loader_for_kind(&descriptor.kind)?,
				};
				loader.materialize(manager, descriptor, &self.cid)
			}
		}
	}
}

impl fmt::Debug for FactoryEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut s = f.debug_struct("FactoryEntry");
		s.field("cid", &self.cid)
			.field("class_name", &self.class_name)
			.field("contract_id", &self.contract_id);
		match &self.source {
			FactorySource::Live(_) => s.field("source", &"live"),
			FactorySource::Deferred { descriptor, .. } => s.field("source", descriptor),
		};
		s.finish()
	}
}

/// Value side of the contract id map.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ContractSlot {
	Mapped(Cid),
	/// Remembered miss: the store had no record for the contract id.
	Missing,
}
