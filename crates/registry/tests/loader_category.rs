//! Loader providers linked in through `inventory` and registered at runtime.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{running, tag_of, widget_factory};
use comreg_registry::{
	Cid, ComponentError, ComponentManager, Factory, Iid, Loader, LoaderProviderDef, Location, ModuleDescriptor, NATIVE_KIND, Result,
	When,
};
use comreg_store::MemoryStore;
use pretty_assertions::assert_eq;

const LINKED_KIND: &str = "application/x-linked";
const SWEPT: Cid = Cid::from_u128(0x5e7);

/// Tags every object with where the loader came from.
struct OriginLoader {
	origin: &'static str,
}

impl Loader for OriginLoader {
	fn kind(&self) -> &str {
		LINKED_KIND
	}

	fn materialize(&self, _: &ComponentManager, _: &ModuleDescriptor, _: &Cid) -> Result<Arc<dyn Factory>> {
		Ok(widget_factory(self.origin))
	}

	fn auto_register_all(&self, manager: &ComponentManager, _: When, _: &Path) -> Result<usize> {
		manager.register_component_with_kind(&SWEPT, Some("Swept"), Some("@test/swept;1"), &Location::Rel("swept.mod".into()), LINKED_KIND, true, false)?;
		Ok(1)
	}
}

fn linked_loader() -> Arc<dyn Loader> {
	Arc::new(OriginLoader { origin: "linked" })
}

comreg_registry::inventory::submit! {
	LoaderProviderDef { kind: LINKED_KIND, create: linked_loader }
}

fn store() -> Arc<MemoryStore> {
	Arc::new(MemoryStore::new())
}

#[test]
fn test_linked_provider_is_found() {
	let manager = running(store());
	let first = manager.loader_for_kind(LINKED_KIND).unwrap();
	let second = manager.loader_for_kind(LINKED_KIND).unwrap();
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(first.kind(), LINKED_KIND);
}

#[test]
fn test_linked_provider_joins_the_sweep() {
	let manager = running(store());
	let summary = manager.auto_register(When::Startup, None).unwrap();
	assert_eq!(summary.registered, 1);

	let object = manager.create_instance_by_contract_id("@test/swept;1", None, &Iid::SUPPORTS).unwrap();
	assert_eq!(tag_of(&object), "linked");
}

#[test]
fn test_runtime_provider_shadows_linked_one() {
	let manager = ComponentManager::new(store(), comreg_registry::ManagerConfig::default());
	manager
		.register_loader_provider(LINKED_KIND, || Arc::new(OriginLoader { origin: "runtime" }) as Arc<dyn Loader>)
		.unwrap();
	manager.init().unwrap();

	let cid = Cid::from_u128(0x7e57);
	manager
		.register_component_with_kind(&cid, None, None, &Location::Rel("x.mod".into()), LINKED_KIND, true, false)
		.unwrap();
	let object = manager.create_instance(&cid, None, &Iid::SUPPORTS).unwrap();
	assert_eq!(tag_of(&object), "runtime");
}

#[test]
fn test_provider_registration_is_validated() {
	let manager = running(store());
	let err = manager.register_loader_provider("", linked_loader).unwrap_err();
	assert!(matches!(err, ComponentError::NullArgument), "{err}");
	let err = manager.register_loader_provider(NATIVE_KIND, linked_loader).unwrap_err();
	assert!(matches!(err, ComponentError::Unexpected(_)), "{err}");

	let err = manager.loader_for_kind("application/x-nobody").err().expect("expected LoaderNotFound");
	assert!(matches!(err, ComponentError::LoaderNotFound(ref kind) if kind == "application/x-nobody"), "{err}");
}
