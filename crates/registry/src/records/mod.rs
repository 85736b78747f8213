//! Persistent registration records.
//!
//! Layout inside the [`Store`]:
//!
//! ```text
//! comreg                        Version
//! comreg/classID/<cid>          ClassName, ContractID, InprocServer, ComponentType
//! comreg/contractID/<contract>  ClassID
//! comreg/components/<location>  ComponentsCount, LastModTimeStamp, FileSize
//! ```
//!
//! `InprocServer` holds the encoded [`Location`] as bytes. Every read builds
//! owned values; nothing here caches store contents.

use std::sync::Arc;

use comreg_primitives::{Cid, ContractId};
use comreg_store::{KeyPath, Store, StoreExt};
use tracing::{info, warn};

use crate::error::Result;
use crate::location::Location;

/// Version written under `comreg`. Records with any other version are discarded on init.
pub const LAYOUT_VERSION: i64 = 1;

const ROOT: &str = "comreg";
const CLASS_ID: &str = "classID";
const CONTRACT_ID: &str = "contractID";
const COMPONENTS: &str = "components";

const VERSION: &str = "Version";
const CLASS_NAME: &str = "ClassName";
const CONTRACT: &str = "ContractID";
const INPROC_SERVER: &str = "InprocServer";
const COMPONENT_TYPE: &str = "ComponentType";
const CLASS_ID_VALUE: &str = "ClassID";
const COMPONENTS_COUNT: &str = "ComponentsCount";
const LAST_MOD: &str = "LastModTimeStamp";
const FILE_SIZE: &str = "FileSize";

/// A class registration as persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredClass {
	pub class_name: Option<String>,
	pub contract_id: Option<ContractId>,
	pub location: Location,
	pub kind: String,
}

/// Modification time (milliseconds since the epoch) and size of a module file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ModuleStamp {
	pub modified_ms: i64,
	pub size: i64,
}

/// A module as recorded by autoregistration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRecord {
	pub location: String,
	pub stamp: Option<ModuleStamp>,
	pub components: i64,
}

/// Typed view of the registration subtree of a [`Store`].
pub struct ComponentRecords {
	store: Arc<dyn Store>,
}

fn root() -> KeyPath {
	KeyPath::root().child(ROOT)
}

fn class_key(cid: &Cid) -> KeyPath {
	root().child(CLASS_ID).child(cid.to_string())
}

fn contract_key(contract: &str) -> KeyPath {
	root().child(CONTRACT_ID).child(contract)
}

fn module_key(location: &str) -> KeyPath {
	root().child(COMPONENTS).child(location)
}

impl ComponentRecords {
	pub fn new(store: Arc<dyn Store>) -> Self {
		Self { store }
	}

	/// Ensures the layout is current, discarding records written by another
	/// layout version. Returns whether anything was discarded.
	pub fn check_layout(&self) -> Result<bool> {
		let root = root();
		let version = match self.store.get_value(&root, VERSION)? {
			Some(comreg_store::Value::Int(v)) => Some(v),
			_ => None,
		};
		if version == Some(LAYOUT_VERSION) {
			return Ok(false);
		}
		let discarded = self.store.remove_subtree(&root)?;
		if discarded {
			info!(found = ?version, expected = LAYOUT_VERSION, "discarding registrations from another layout version");
		}
		self.store.add_subtree(&root)?;
		self.store.set_int(&root, VERSION, LAYOUT_VERSION)?;
		for sub in [CLASS_ID, CONTRACT_ID, COMPONENTS] {
			self.store.add_subtree(&root.child(sub))?;
		}
		Ok(discarded)
	}

	pub fn read_class(&self, cid: &Cid) -> Result<Option<StoredClass>> {
		let key = class_key(cid);
		let Some(raw) = self.store.get_bytes(&key, INPROC_SERVER)? else {
			return Ok(None);
		};
		let encoded = String::from_utf8_lossy(&raw);
		let location = match Location::parse(&encoded) {
			Ok(location) => location,
			Err(e) => {
				warn!(cid = %cid, error = %e, "ignoring class record with unreadable location");
				return Ok(None);
			}
		};
		Ok(Some(StoredClass {
			class_name: self.store.get_str(&key, CLASS_NAME)?.filter(|s| !s.is_empty()),
			contract_id: ContractId::non_empty(self.store.get_str(&key, CONTRACT)?.as_deref()),
			location,
			kind: self.store.get_str(&key, COMPONENT_TYPE)?.unwrap_or_default(),
		}))
	}

	/// Persists a class registration and points its contract id at it.
	///
	/// The component count of the location is bumped unless the class was
	/// already recorded there. A previous contract record of the class is
	/// dropped if the contract changed and the record still points at `cid`.
	pub fn write_class(&self, cid: &Cid, class: &StoredClass) -> Result<()> {
		let previous = self.read_class(cid)?;
		let key = class_key(cid);
		self.store.remove_subtree(&key)?;
		self.store.add_subtree(&key)?;
		if let Some(name) = &class.class_name {
			self.store.set_str(&key, CLASS_NAME, name.as_str())?;
		}
		if let Some(contract) = &class.contract_id {
			self.store.set_str(&key, CONTRACT, contract.as_str())?;
			let ckey = contract_key(contract.as_str());
			self.store.add_subtree(&ckey)?;
			self.store.set_str(&ckey, CLASS_ID_VALUE, cid.to_string())?;
		}
		self.store.set_bytes(&key, INPROC_SERVER, class.location.to_string().into_bytes())?;
		self.store.set_str(&key, COMPONENT_TYPE, class.kind.as_str())?;

		if let Some(old) = previous.as_ref().and_then(|p| p.contract_id.as_ref())
			&& class.contract_id.as_ref() != Some(old)
			&& self.read_contract(old.as_str())? == Some(*cid)
		{
			self.store.remove_subtree(&contract_key(old.as_str()))?;
		}

		match previous {
			Some(prev) if prev.location == class.location => {}
			Some(prev) => {
				self.adjust_count(&prev.location.to_string(), -1)?;
				self.adjust_count(&class.location.to_string(), 1)?;
			}
			None => self.adjust_count(&class.location.to_string(), 1)?,
		}
		Ok(())
	}

	/// Forgets the class if it is recorded under `location` (compared case-insensitively).
	///
	/// Drops the contract record when it still points at `cid`, and the
	/// location record once its last component is gone.
	pub fn forget_class(&self, cid: &Cid, location: &Location) -> Result<bool> {
		let Some(stored) = self.read_class(cid)? else {
			return Ok(false);
		};
		if !stored.location.eq_ignore_case(location) {
			return Ok(false);
		}
		self.store.remove_subtree(&class_key(cid))?;
		if let Some(contract) = &stored.contract_id
			&& self.read_contract(contract.as_str())? == Some(*cid)
		{
			self.store.remove_subtree(&contract_key(contract.as_str()))?;
		}
		self.adjust_count(&stored.location.to_string(), -1)?;
		Ok(true)
	}

	pub fn read_contract(&self, contract: &str) -> Result<Option<Cid>> {
		let Some(text) = self.store.get_str(&contract_key(contract), CLASS_ID_VALUE)? else {
			return Ok(None);
		};
		match Cid::parse(&text) {
			Ok(cid) => Ok(Some(cid)),
			Err(e) => {
				warn!(contract, error = %e, "ignoring contract record with unreadable class id");
				Ok(None)
			}
		}
	}

	/// All CIDs with a class record, sorted.
	pub fn class_ids(&self) -> Result<Vec<Cid>> {
		let names = self.store.subtrees(&root().child(CLASS_ID))?;
		let mut cids: Vec<Cid> = names
			.iter()
			.filter_map(|name| match Cid::parse(name) {
				Ok(cid) => Some(cid),
				Err(e) => {
					warn!(key = %name, error = %e, "skipping malformed class record");
					None
				}
			})
			.collect();
		cids.sort();
		Ok(cids)
	}

	/// All recorded contract ids with the CID they map to.
	pub fn contract_ids(&self) -> Result<Vec<(ContractId, Cid)>> {
		let mut out = Vec::new();
		for name in self.store.subtrees(&root().child(CONTRACT_ID))? {
			if let Some(cid) = self.read_contract(&name)? {
				out.push((ContractId::from(name), cid));
			}
		}
		Ok(out)
	}

	pub fn module_stamp(&self, location: &Location) -> Result<Option<ModuleStamp>> {
		let key = module_key(&location.to_string());
		let modified = self.store.get_int(&key, LAST_MOD)?;
		let size = self.store.get_int(&key, FILE_SIZE)?;
		Ok(modified.zip(size).map(|(modified_ms, size)| ModuleStamp { modified_ms, size }))
	}

	/// Records the file info of a module. The component count is left as is
	/// (zero for a module seen for the first time).
	pub fn record_module(&self, location: &Location, stamp: ModuleStamp) -> Result<()> {
		let key = module_key(&location.to_string());
		self.store.add_subtree(&key)?;
		if self.store.get_int(&key, COMPONENTS_COUNT)?.is_none() {
			self.store.set_int(&key, COMPONENTS_COUNT, 0)?;
		}
		self.store.set_int(&key, LAST_MOD, stamp.modified_ms)?;
		self.store.set_int(&key, FILE_SIZE, stamp.size)?;
		Ok(())
	}

	pub fn forget_module(&self, location: &Location) -> Result<bool> {
		Ok(self.store.remove_subtree(&module_key(&location.to_string()))?)
	}

	pub fn component_count(&self, location: &Location) -> Result<i64> {
		Ok(self
			.store
			.get_int(&module_key(&location.to_string()), COMPONENTS_COUNT)?
			.unwrap_or(0))
	}

	/// Every recorded module, sorted by encoded location.
	pub fn modules(&self) -> Result<Vec<ModuleRecord>> {
		let mut out = Vec::new();
		for name in self.store.subtrees(&root().child(COMPONENTS))? {
			let key = module_key(&name);
			let modified = self.store.get_int(&key, LAST_MOD)?;
			let size = self.store.get_int(&key, FILE_SIZE)?;
			out.push(ModuleRecord {
				stamp: modified.zip(size).map(|(modified_ms, size)| ModuleStamp { modified_ms, size }),
				components: self.store.get_int(&key, COMPONENTS_COUNT)?.unwrap_or(0),
				location: name,
			});
		}
		Ok(out)
	}

	pub fn flush(&self) -> Result<()> {
		Ok(self.store.flush()?)
	}

	fn adjust_count(&self, location: &str, delta: i64) -> Result<()> {
		let key = module_key(location);
		let count = self.store.get_int(&key, COMPONENTS_COUNT)?.unwrap_or(0) + delta;
		if count <= 0 && delta < 0 {
			self.store.remove_subtree(&key)?;
			return Ok(());
		}
		self.store.add_subtree(&key)?;
		self.store.set_int(&key, COMPONENTS_COUNT, count.max(0))?;
		Ok(())
	}
}
