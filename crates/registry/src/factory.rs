//! Factories and the objects they produce.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use comreg_primitives::{Cid, ContractId, Iid};

use crate::error::Result;

/// A constructed component instance.
///
/// Callers downcast to the concrete type (or to a shared trait object the
/// component documents) to use it.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Produces instances of one class.
pub trait Factory: Send + Sync {
	/// Constructs a new instance exposing `iid`, optionally aggregated inside `outer`.
	fn create_instance(&self, outer: Option<&Object>, iid: &Iid) -> Result<Object>;

	/// Views the factory itself as an interface other than
	/// [`Iid::FACTORY`] / [`Iid::SUPPORTS`].
	fn query_interface(&self, _iid: &Iid) -> Option<Object> {
		None
	}
}

/// [`Factory`] backed by a closure.
pub struct FnFactory<F>(F);

impl<F> FnFactory<F>
where
	F: Fn(Option<&Object>, &Iid) -> Result<Object> + Send + Sync,
{
	pub fn new(create: F) -> Self {
		Self(create)
	}
}

impl<F> Factory for FnFactory<F>
where
	F: Fn(Option<&Object>, &Iid) -> Result<Object> + Send + Sync,
{
	fn create_instance(&self, outer: Option<&Object>, iid: &Iid) -> Result<Object> {
		(self.0)(outer, iid)
	}
}

/// Wraps a closure into a shared factory.
pub fn factory_fn<F>(create: F) -> Arc<dyn Factory>
where
	F: Fn(Option<&Object>, &Iid) -> Result<Object> + Send + Sync + 'static,
{
	Arc::new(FnFactory::new(create))
}

/// Recovers the factory from an object returned by
/// [`ComponentManager::get_class_object`](crate::ComponentManager::get_class_object).
pub fn as_factory(object: &Object) -> Option<Arc<dyn Factory>> {
	object.downcast_ref::<Arc<dyn Factory>>().cloned()
}

pub(crate) fn same_factory(a: &Arc<dyn Factory>, b: &Arc<dyn Factory>) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Class name and contract id recorded for a CID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassInfo {
	pub cid: Cid,
	pub class_name: Option<String>,
	pub contract_id: Option<ContractId>,
}

impl fmt::Display for ClassInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.cid)?;
		if let Some(name) = &self.class_name {
			write!(f, " {name}")?;
		}
		if let Some(contract) = &self.contract_id {
			write!(f, " ({contract})")?;
		}
		Ok(())
	}
}
