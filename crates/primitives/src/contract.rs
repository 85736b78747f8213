use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Stable name for a role or service, mapped indirectly to a [`Cid`](crate::Cid).
///
/// Backed by a shared `Arc<str>`, so clones handed between the registry maps
/// and callers never copy the text.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractId(Arc<str>);

impl ContractId {
	pub fn new(id: impl AsRef<str>) -> Self {
		Self(Arc::from(id.as_ref()))
	}

	/// Normalizes an optional registration argument: empty strings mean "none".
	pub fn non_empty(id: Option<&str>) -> Option<Self> {
		id.filter(|s| !s.is_empty()).map(Self::new)
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ContractId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for ContractId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ContractId({:?})", &*self.0)
	}
}

impl Borrow<str> for ContractId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl AsRef<str> for ContractId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl From<&str> for ContractId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for ContractId {
	fn from(value: String) -> Self {
		Self(Arc::from(value))
	}
}
