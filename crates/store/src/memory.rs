use parking_lot::RwLock;

use crate::Store;
use crate::error::{Result, StoreError};
use crate::key::KeyPath;
use crate::tree::Node;
use crate::value::Value;

/// In-memory [`Store`]. Contents are lost when the value is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
	root: RwLock<Node>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn from_tree(root: Node) -> Self {
		Self {
			root: RwLock::new(root),
		}
	}

	pub(crate) fn snapshot(&self) -> Node {
		self.root.read().clone()
	}
}

impl Store for MemoryStore {
	fn add_subtree(&self, key: &KeyPath) -> Result<()> {
		self.root.write().ensure(key);
		Ok(())
	}

	fn remove_subtree(&self, key: &KeyPath) -> Result<bool> {
		Ok(self.root.write().remove(key))
	}

	fn has_subtree(&self, key: &KeyPath) -> Result<bool> {
		Ok(self.root.read().get(key).is_some())
	}

	fn get_value(&self, key: &KeyPath, name: &str) -> Result<Option<Value>> {
		Ok(self
			.root
			.read()
			.get(key)
			.and_then(|node| node.values.get(name))
			.cloned())
	}

	fn set_value(&self, key: &KeyPath, name: &str, value: Value) -> Result<()> {
		let mut root = self.root.write();
		let node = root.get_mut(key).ok_or_else(|| StoreError::not_found(key))?;
		node.values.insert(name.to_string(), value);
		Ok(())
	}

	fn remove_value(&self, key: &KeyPath, name: &str) -> Result<bool> {
		Ok(self
			.root
			.write()
			.get_mut(key)
			.is_some_and(|node| node.values.remove(name).is_some()))
	}

	fn subtrees(&self, key: &KeyPath) -> Result<Vec<String>> {
		Ok(self
			.root
			.read()
			.get(key)
			.map(|node| node.children.keys().cloned().collect())
			.unwrap_or_default())
	}
}
