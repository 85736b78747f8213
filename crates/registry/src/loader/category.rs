//! The "loaders" category: every known provider of a module kind.
//!
//! Providers linked into the binary submit a [`LoaderProviderDef`] through
//! `inventory`; embedders add more at runtime. Runtime providers shadow
//! linked ones of the same kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Loader;

/// Runtime loader constructor.
pub type LoaderCtor = Arc<dyn Fn() -> Arc<dyn Loader> + Send + Sync>;

/// Link-time loader provider.
///
/// ```ignore
/// inventory::submit! {
/// 	LoaderProviderDef { kind: "application/x-script", create: make_script_loader }
/// }
/// ```
pub struct LoaderProviderDef {
	pub kind: &'static str,
	pub create: fn() -> Arc<dyn Loader>,
}

inventory::collect!(LoaderProviderDef);

#[derive(Default)]
pub(crate) struct LoaderCategory {
	runtime: RwLock<BTreeMap<String, LoaderCtor>>,
}

impl LoaderCategory {
	pub fn register(&self, kind: &str, ctor: LoaderCtor) {
		self.runtime.write().insert(kind.to_string(), ctor);
	}

	pub fn provider(&self, kind: &str) -> Option<LoaderCtor> {
		if let Some(ctor) = self.runtime.read().get(kind) {
			return Some(ctor.clone());
		}
		inventory::iter::<LoaderProviderDef>
			.into_iter()
			.find(|def| def.kind == kind)
			.map(|def| {
				let create = def.create;
				Arc::new(move || create()) as LoaderCtor
			})
	}

	/// Every provided kind, sorted and deduplicated.
	pub fn kinds(&self) -> Vec<String> {
		let mut kinds: Vec<String> = self.runtime.read().keys().cloned().collect();
		kinds.extend(inventory::iter::<LoaderProviderDef>.into_iter().map(|def| def.kind.to_string()));
		kinds.sort();
		kinds.dedup();
		kinds
	}
}
