use std::sync::atomic::Ordering;

use comreg_primitives::{Cid, ContractId};
use tracing::{debug, warn};

use super::ComponentManager;
use crate::entry::ContractSlot;
use crate::error::Result;

/// Finite snapshot iterator over registry keys. [`rewind`](Self::rewind) restarts it.
#[derive(Clone, Debug)]
pub struct Enumeration<T> {
	items: Vec<T>,
	position: usize,
}

impl<T> Enumeration<T> {
	pub(crate) fn new(items: Vec<T>) -> Self {
		Self { items, position: 0 }
	}

	pub fn rewind(&mut self) {
		self.position = 0;
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}
}

impl<T: Clone> Iterator for Enumeration<T> {
	type Item = T;

	fn next(&mut self) -> Option<T> {
		let item = self.items.get(self.position)?.clone();
		self.position += 1;
		Some(item)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = self.items.len().saturating_sub(self.position);
		(remaining, Some(remaining))
	}
}

impl<T: Clone> ExactSizeIterator for Enumeration<T> {}

impl ComponentManager {
	/// Imports every class and contract record from the store, once per manager.
	pub(crate) fn ensure_prepopulated(&self) -> Result<()> {
		if self.prepopulated.load(Ordering::Acquire) {
			return Ok(());
		}
		let _gate = self.prepopulate_gate.lock();
		if self.prepopulated.load(Ordering::Acquire) {
			return Ok(());
		}

		let cids = self.records.class_ids()?;
		for cid in &cids {
			if self.find_factory_entry(cid, true).is_none() {
				warn!(cid = %cid, "class record could not be imported");
			}
		}
		let contracts = self.records.contract_ids()?;
		{
			let mut state = self.state.lock();
			for (contract, cid) in &contracts {
				let slot = state.contracts.entry(contract.clone()).or_insert(ContractSlot::Missing);
				if *slot == ContractSlot::Missing {
					*slot = ContractSlot::Mapped(*cid);
				}
			}
		}

		self.prepopulated.store(true, Ordering::Release);
		debug!(classes = cids.len(), contracts = contracts.len(), "store imported");
		Ok(())
	}

	/// Every registered CID, sorted.
	pub fn enumerate_cids(&self) -> Result<Enumeration<Cid>> {
		self.ensure_prepopulated()?;
		let mut cids: Vec<Cid> = self.state.lock().factories.keys().copied().collect();
		cids.sort();
		Ok(Enumeration::new(cids))
	}

	/// Every contract id currently mapped to a CID, sorted.
	pub fn enumerate_contract_ids(&self) -> Result<Enumeration<ContractId>> {
		self.ensure_prepopulated()?;
		let mut contracts: Vec<ContractId> = self
			.state
			.lock()
			.contracts
			.iter()
			.filter(|(_, slot)| matches!(slot, ContractSlot::Mapped(_)))
			.map(|(contract, _)| contract.clone())
			.collect();
		contracts.sort();
		Ok(Enumeration::new(contracts))
	}
}
