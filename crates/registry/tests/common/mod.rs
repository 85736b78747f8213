#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use comreg_registry::{Cid, ComponentError, ComponentManager, Factory, Iid, Loader, ModuleDescriptor, Object, Result, factory_fn};
use comreg_store::{KeyPath, MemoryStore, Store, StoreError, Value};

/// Object produced by test factories.
#[derive(Debug, PartialEq, Eq)]
pub struct Widget {
	pub tag: &'static str,
	pub iid: Iid,
}

pub fn widget_factory(tag: &'static str) -> Arc<dyn Factory> {
	factory_fn(move |_, iid| Ok(Arc::new(Widget { tag, iid: *iid }) as Object))
}

pub fn tag_of(object: &Object) -> &'static str {
	object.downcast_ref::<Widget>().map(|w| w.tag).unwrap_or("<not a widget>")
}

pub fn running(store: Arc<dyn Store>) -> ComponentManager {
	let manager = ComponentManager::new(store, comreg_registry::ManagerConfig::default());
	manager.init().unwrap();
	manager
}

/// Store wrapper counting reads of contract id records.
#[derive(Default)]
pub struct CountingStore {
	inner: MemoryStore,
	pub contract_reads: AtomicUsize,
	pub class_reads: AtomicUsize,
}

impl CountingStore {
	pub fn contract_reads(&self) -> usize {
		self.contract_reads.load(Ordering::SeqCst)
	}

	pub fn class_reads(&self) -> usize {
		self.class_reads.load(Ordering::SeqCst)
	}
}

impl Store for CountingStore {
	fn add_subtree(&self, key: &KeyPath) -> comreg_store::Result<()> {
		self.inner.add_subtree(key)
	}

	fn remove_subtree(&self, key: &KeyPath) -> comreg_store::Result<bool> {
		self.inner.remove_subtree(key)
	}

	fn has_subtree(&self, key: &KeyPath) -> comreg_store::Result<bool> {
		self.inner.has_subtree(key)
	}

	fn get_value(&self, key: &KeyPath, name: &str) -> comreg_store::Result<Option<Value>> {
		match key.segments().get(1).map(String::as_str) {
			Some("contractID") => self.contract_reads.fetch_add(1, Ordering::SeqCst),
			Some("classID") if name == "InprocServer" => self.class_reads.fetch_add(1, Ordering::SeqCst),
			_ => 0,
		};
		self.inner.get_value(key, name)
	}

	fn set_value(&self, key: &KeyPath, name: &str, value: Value) -> comreg_store::Result<()> {
		self.inner.set_value(key, name, value)
	}

	fn remove_value(&self, key: &KeyPath, name: &str) -> comreg_store::Result<bool> {
		self.inner.remove_value(key, name)
	}

	fn subtrees(&self, key: &KeyPath) -> comreg_store::Result<Vec<String>> {
		self.inner.subtrees(key)
	}
}

/// Store whose writes fail once `fail_writes` is set.
#[derive(Default)]
pub struct FailingStore {
	inner: MemoryStore,
	pub fail_writes: AtomicBool,
}

impl FailingStore {
	fn write<T>(&self, op: impl FnOnce(&MemoryStore) -> comreg_store::Result<T>) -> comreg_store::Result<T> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(StoreError::Io {
				path: "registry.bin".into(),
				source: std::io::Error::other("disk full"),
			});
		}
		op(&self.inner)
	}
}

impl Store for FailingStore {
	fn add_subtree(&self, key: &KeyPath) -> comreg_store::Result<()> {
		self.write(|s| s.add_subtree(key))
	}

	fn remove_subtree(&self, key: &KeyPath) -> comreg_store::Result<bool> {
		self.write(|s| s.remove_subtree(key))
	}

	fn has_subtree(&self, key: &KeyPath) -> comreg_store::Result<bool> {
		self.inner.has_subtree(key)
	}

	fn get_value(&self, key: &KeyPath, name: &str) -> comreg_store::Result<Option<Value>> {
		self.inner.get_value(key, name)
	}

	fn set_value(&self, key: &KeyPath, name: &str, value: Value) -> comreg_store::Result<()> {
		self.write(|s| s.set_value(key, name, value))
	}

	fn remove_value(&self, key: &KeyPath, name: &str) -> comreg_store::Result<bool> {
		self.write(|s| s.remove_value(key, name))
	}

	fn subtrees(&self, key: &KeyPath) -> comreg_store::Result<Vec<String>> {
		self.inner.subtrees(key)
	}
}

/// Loader whose factories produce widgets tagged with the module location.
pub struct WidgetLoader {
	pub kind: &'static str,
	pub materialized: AtomicUsize,
	pub fail_registration: bool,
}

impl WidgetLoader {
	pub fn new(kind: &'static str) -> Self {
		Self {
			kind,
			materialized: AtomicUsize::new(0),
			fail_registration: false,
		}
	}
}

impl Loader for WidgetLoader {
	fn kind(&self) -> &str {
		self.kind
	}

	fn materialize(&self, _manager: &ComponentManager, descriptor: &ModuleDescriptor, _cid: &Cid) -> Result<Arc<dyn Factory>> {
		self.materialized.fetch_add(1, Ordering::SeqCst);
		let tag: &'static str = Box::leak(descriptor.location.to_string().into_boxed_str());
		Ok(widget_factory(tag))
	}

	fn on_registered(&self, _manager: &ComponentManager, registration: &comreg_registry::Registration) -> Result<()> {
		if self.fail_registration {
			return Err(ComponentError::Failed(format!("refusing {}", registration.cid)));
		}
		Ok(())
	}

	fn auto_register_all(&self, _manager: &ComponentManager, _when: comreg_registry::When, _directory: &Path) -> Result<usize> {
		Ok(0)
	}
}
