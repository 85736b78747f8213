//! Component registry and factory resolution.
//!
//! A [`ComponentManager`] maps class ids ([`Cid`]) and contract ids to
//! factories. Entries are either live factories handed in by the caller or
//! descriptors (module location plus module kind) that a [`Loader`] turns into
//! a factory on demand. Registrations can be persisted to a
//! [`Store`](comreg_store::Store) and are imported lazily on lookup.
//!
//! The native loader is always present and loads dynamic libraries speaking
//! the `comreg-cabi` ABI. Other loaders come from the loader category: types
//! submitted with [`LoaderProviderDef`] at link time, or providers added with
//! [`ComponentManager::register_loader_provider`].

pub mod config;
mod entry;
mod error;
mod factory;
pub mod loader;
pub mod location;
mod manager;
pub mod native;
pub mod records;

pub use comreg_primitives::{Cid, ContractId, Iid, When};
pub use config::{ConfigError, ManagerConfig};
pub use entry::{FactoryEntry, FactorySource, ModuleDescriptor};
pub use error::{ComponentError, Result};
pub use factory::{ClassInfo, Factory, FnFactory, Object, as_factory, factory_fn};
pub use loader::{Loader, LoaderCtor, LoaderProviderDef, Registration};
pub use location::Location;
pub use manager::{AutoRegisterSummary, ComponentManager, Enumeration, Lifecycle};
pub use native::{NATIVE_KIND, NativeLoader};
// Re-exported so `inventory::submit!` works without a direct dependency.
pub use inventory;
