use std::path::PathBuf;

use crate::key::KeyPath;
use crate::value::ValueKind;

/// Errors reported by [`Store`](crate::Store) implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	/// The key has not been added to the tree.
	#[error("no such key: {0}")]
	NotFound(String),

	/// A value exists but holds a different kind than the caller asked for.
	#[error("value {name:?} under {key} is {actual}, expected {expected}")]
	TypeMismatch {
		key: String,
		name: String,
		expected: ValueKind,
		actual: ValueKind,
	},

	/// Reading or writing the backing file failed.
	#[error("I/O error on {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// The backing file could not be encoded or decoded.
	#[error("store image {path} is corrupt: {source}")]
	Codec {
		path: PathBuf,
		#[source]
		source: postcard::Error,
	},
}

impl StoreError {
	pub(crate) fn not_found(key: &KeyPath) -> Self {
		Self::NotFound(key.to_string())
	}

	pub(crate) fn type_mismatch(key: &KeyPath, name: &str, expected: ValueKind, actual: ValueKind) -> Self {
		Self::TypeMismatch {
			key: key.to_string(),
			name: name.to_string(),
			expected,
			actual,
		}
	}
}

/// Result type for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
