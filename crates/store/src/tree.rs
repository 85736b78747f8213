use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::KeyPath;
use crate::value::Value;

/// One node of the store tree. Also the on-disk image of [`FileStore`](crate::FileStore).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Node {
	pub values: BTreeMap<String, Value>,
	pub children: BTreeMap<String, Node>,
}

impl Node {
	pub fn get(&self, key: &KeyPath) -> Option<&Node> {
		key.segments()
			.iter()
			.try_fold(self, |node, segment| node.children.get(segment))
	}

	pub fn get_mut(&mut self, key: &KeyPath) -> Option<&mut Node> {
		key.segments()
			.iter()
			.try_fold(self, |node, segment| node.children.get_mut(segment))
	}

	/// Returns the node at `key`, creating it and its ancestors.
	pub fn ensure(&mut self, key: &KeyPath) -> &mut Node {
		let mut node = self;
		for segment in key.segments() {
			node = node.children.entry(segment.clone()).or_default();
		}
		node
	}

	/// Removes the subtree at `key`. The root itself is cleared rather than removed.
	pub fn remove(&mut self, key: &KeyPath) -> bool {
		let Some(parent_key) = key.parent() else {
			let had_content = !self.values.is_empty() || !self.children.is_empty();
			*self = Node::default();
			return had_content;
		};
		let Some(name) = key.last() else {
			return false;
		};
		self.get_mut(&parent_key)
			.is_some_and(|parent| parent.children.remove(name).is_some())
	}
}
