use std::path::Path;
use std::sync::Arc;

use comreg_primitives::When;
use tracing::{debug, info, warn};

use super::ComponentManager;
use crate::error::{ComponentError, Result};
use crate::loader::Loader;

/// Outcome of an autoregistration sweep.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoRegisterSummary {
	/// Modules registered by the directory scans.
	pub registered: usize,
	/// Deferred registration passes run before reaching the fixpoint.
	pub deferred_passes: usize,
}

impl ComponentManager {
	/// Sweeps `directory` (the configured components directory when `None`)
	/// with every loader, then retries deferred registrations until a pass
	/// registers nothing.
	///
	/// The native loader scans first. Registrations made before an error stay
	/// committed.
	///
	/// # Errors
	///
	/// [`ComponentError::DeferredRegistrationStalled`] when more than the
	/// configured number of passes register something, or a pass claims
	/// progress while the number of deferred modules does not shrink. The
	/// final pass that registers nothing is not counted. Loader errors are returned as is.
	pub fn auto_register(&self, when: When, directory: Option<&Path>) -> Result<AutoRegisterSummary> {
		self.ensure_not_shut_down("auto_register during shutdown")?;
		if self.config.read().no_autoreg {
			info!("autoregistration disabled");
			return Ok(AutoRegisterSummary::default());
		}
		if let Some(dir) = directory {
			self.config.write().components_dir = dir.to_path_buf();
		}
		let dir = self.components_dir();
		info!(dir = %dir.display(), %when, "autoregistration started");

		let mut registered = self.native.auto_register_all(self, when, &dir)?;
		self.instantiate_providers();
		for loader in self.other_loaders() {
			registered += loader.auto_register_all(self, when, &dir)?;
		}

		let deferred_passes = self.register_deferred_until_fixpoint(when)?;
		info!(registered, deferred_passes, "autoregistration finished");
		Ok(AutoRegisterSummary {
			registered,
			deferred_passes,
		})
	}

	/// Registers one module, asking each loader in turn until one accepts it.
	///
	/// Returns `false` when no loader registered the module (unchanged,
	/// deferred, or of an unknown kind). A loader error does not stop the
	/// remaining loaders; it is reported as
	/// [`ComponentError::FactoryNotRegistered`] only if none of them claims
	/// the module.
	pub fn auto_register_component(&self, when: When, path: &Path) -> Result<bool> {
		self.ensure_not_shut_down("auto_register_component during shutdown")?;
		self.ask_loaders(path, "register", |loader| loader.auto_register_one(self, when, path))
	}

	/// Unregisters one module, asking each loader in turn until one claims it.
	/// Errors are handled as in [`auto_register_component`](Self::auto_register_component).
	pub fn auto_unregister_component(&self, when: When, path: &Path) -> Result<bool> {
		self.ensure_not_shut_down("auto_unregister_component during shutdown")?;
		self.ask_loaders(path, "unregister", |loader| loader.auto_unregister_one(self, when, path))
	}

	fn ask_loaders(&self, path: &Path, action: &'static str, mut ask: impl FnMut(&dyn Loader) -> Result<bool>) -> Result<bool> {
		let mut failed = false;
		for loader in self.sweep_order() {
			match ask(loader.as_ref()) {
				Ok(true) => return Ok(true),
				Ok(false) => {}
				Err(e) => {
					warn!(path = %path.display(), kind = loader.kind(), error = %e, action, "loader failed on module");
					failed = true;
				}
			}
		}
		if failed {
			return Err(ComponentError::not_registered(path.display()));
		}
		Ok(false)
	}

	/// Instantiates every provider of the loader category. Failures are logged and skipped.
	fn instantiate_providers(&self) {
		for kind in self.category.kinds() {
			if let Err(e) = self.loader_for_kind(&kind) {
				warn!(kind, error = %e, "skipping loader provider");
			}
		}
	}

	/// Native loader first, then every other loader sorted by kind.
	fn sweep_order(&self) -> Vec<Arc<dyn Loader>> {
		self.instantiate_providers();
		let mut loaders: Vec<Arc<dyn Loader>> = vec![self.native.clone()];
		loaders.extend(self.other_loaders());
		loaders
	}

	fn total_deferred(&self, loaders: &[Arc<dyn Loader>]) -> usize {
		loaders.iter().map(|l| l.deferred_count()).sum()
	}

	fn register_deferred_until_fixpoint(&self, when: When) -> Result<usize> {
		let max_passes = self.config.read().max_deferred_passes;
		let mut loaders: Vec<Arc<dyn Loader>> = vec![self.native.clone()];
		loaders.extend(self.other_loaders());

		let mut pending = self.total_deferred(&loaders);
		let mut passes = 0;
		loop {
			passes += 1;

			let mut progress = false;
			for loader in &loaders {
				progress |= loader.register_deferred(self, when)?;
			}
			if !progress {
				break;
			}

			let now = self.total_deferred(&loaders);
			if pending > 0 && now >= pending {
				warn!(passes, pending = now, "deferred registration stopped shrinking");
				return Err(ComponentError::DeferredRegistrationStalled { passes });
			}
			// Only passes that registered something count against the limit.
			if passes > max_passes {
				warn!(passes, pending = now, "deferred registration hit the pass limit");
				return Err(ComponentError::DeferredRegistrationStalled { passes });
			}
			debug!(pass = passes, remaining = now, "deferred registration pass");
			pending = now;
		}
		Ok(passes)
	}
}
