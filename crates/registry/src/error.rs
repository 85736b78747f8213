use std::path::PathBuf;

use comreg_primitives::{Cid, Iid};
use comreg_store::StoreError;

/// Errors reported by the component manager and its loaders.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ComponentError {
	/// A required identifier or name was null or empty.
	#[error("null argument")]
	NullArgument,

	#[error("out of memory")]
	OutOfMemory,

	/// No entry for the CID or contract id, or the entry's loader could not
	/// produce a factory for it.
	#[error("factory not registered: {0}")]
	FactoryNotRegistered(String),

	/// Registration collided with an existing entry and `replace` was false.
	#[error("factory already registered for {0}")]
	FactoryExists(Cid),

	/// A module is missing, unreadable, or speaks an incompatible ABI.
	#[error("failed to load module {location}: {reason}")]
	ModuleLoadFailed { location: String, reason: String },

	#[error("module {location} does not export {symbol}")]
	EntryPointMissing { location: String, symbol: String },

	/// The call is not valid in the manager's current lifecycle state.
	#[error("unexpected call: {0}")]
	Unexpected(&'static str),

	#[error("store failure: {0}")]
	StoreFailure(#[from] StoreError),

	/// The deferred registration loop stopped converging.
	#[error("deferred registration did not converge after {passes} passes")]
	DeferredRegistrationStalled { passes: usize },

	/// The factory does not expose the requested interface.
	#[error("no such interface: {0}")]
	NoInterface(Iid),

	/// No loader provider is known for a module kind.
	#[error("no loader for module kind {0:?}")]
	LoaderNotFound(String),

	#[error("invalid module location {0:?}")]
	InvalidLocation(String),

	#[error("I/O error on {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// A factory or module reported failure without a more specific reason.
	#[error("{0}")]
	Failed(String),
}

impl ComponentError {
	pub(crate) fn not_registered(what: impl ToString) -> Self {
		Self::FactoryNotRegistered(what.to_string())
	}

	pub(crate) fn load_failed(location: impl ToString, reason: impl ToString) -> Self {
		Self::ModuleLoadFailed {
			location: location.to_string(),
			reason: reason.to_string(),
		}
	}
}

/// Result type for component manager operations.
pub type Result<T, E = ComponentError> = std::result::Result<T, E>;
