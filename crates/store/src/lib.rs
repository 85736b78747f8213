//! Persistent store for component registrations.
//!
//! The store is an abstract hierarchical key/value tree: keys are paths of raw
//! segments, each key carries named scalar or byte-blob values, and subtrees
//! can be added, removed and enumerated. Reads always hand out owned copies.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: the tree lives only in memory (tests, embedded use).
//! - [`FileStore`]: the same tree, loaded from and flushed to a single file.

mod error;
mod file;
mod key;
mod memory;
mod tree;
mod value;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use key::KeyPath;
pub use memory::MemoryStore;
pub use value::{Value, ValueKind};

/// Hierarchical key/value tree consumed by the component manager.
///
/// Implementations must be safe to share between threads; every method takes
/// `&self` and performs its own locking.
pub trait Store: Send + Sync {
	/// Creates `key` and any missing ancestors. Existing subtrees are kept.
	fn add_subtree(&self, key: &KeyPath) -> Result<()>;

	/// Removes `key` with all values and descendants. Returns whether it existed.
	fn remove_subtree(&self, key: &KeyPath) -> Result<bool>;

	fn has_subtree(&self, key: &KeyPath) -> Result<bool>;

	/// Reads a named value. Missing keys and missing names both yield `None`.
	fn get_value(&self, key: &KeyPath, name: &str) -> Result<Option<Value>>;

	/// Writes a named value under an existing key.
	///
	/// # Errors
	///
	/// [`StoreError::NotFound`] if `key` has not been added.
	fn set_value(&self, key: &KeyPath, name: &str, value: Value) -> Result<()>;

	/// Removes a named value. Returns whether it existed.
	fn remove_value(&self, key: &KeyPath, name: &str) -> Result<bool>;

	/// Names of the direct children of `key`, sorted. Empty when `key` is missing.
	fn subtrees(&self, key: &KeyPath) -> Result<Vec<String>>;

	/// Persists pending changes. A no-op for purely in-memory stores.
	fn flush(&self) -> Result<()> {
		Ok(())
	}
}

/// Typed accessors layered over [`Store::get_value`] / [`Store::set_value`].
pub trait StoreExt: Store {
	fn get_str(&self, key: &KeyPath, name: &str) -> Result<Option<String>> {
		match self.get_value(key, name)? {
			None => Ok(None),
			Some(Value::Str(s)) => Ok(Some(s)),
			Some(other) => Err(StoreError::type_mismatch(key, name, ValueKind::Str, other.kind())),
		}
	}

	fn get_int(&self, key: &KeyPath, name: &str) -> Result<Option<i64>> {
		match self.get_value(key, name)? {
			None => Ok(None),
			Some(Value::Int(i)) => Ok(Some(i)),
			Some(other) => Err(StoreError::type_mismatch(key, name, ValueKind::Int, other.kind())),
		}
	}

	fn get_bytes(&self, key: &KeyPath, name: &str) -> Result<Option<Vec<u8>>> {
		match self.get_value(key, name)? {
			None => Ok(None),
			Some(Value::Bytes(b)) => Ok(Some(b)),
			Some(other) => Err(StoreError::type_mismatch(key, name, ValueKind::Bytes, other.kind())),
		}
	}

	fn set_str(&self, key: &KeyPath, name: &str, value: impl Into<String>) -> Result<()> {
		self.set_value(key, name, Value::Str(value.into()))
	}

	fn set_int(&self, key: &KeyPath, name: &str, value: i64) -> Result<()> {
		self.set_value(key, name, Value::Int(value))
	}

	fn set_bytes(&self, key: &KeyPath, name: &str, value: impl Into<Vec<u8>>) -> Result<()> {
		self.set_value(key, name, Value::Bytes(value.into()))
	}
}

impl<S: Store + ?Sized> StoreExt for S {}
