//! Identity types for the component registry.
//!
//! Everything here is plain data: 128-bit class and interface identifiers,
//! interned contract identifiers, and the registration instant passed to
//! loaders.

/// Contract identifiers (role names mapped to a class).
pub mod contract;
/// 128-bit class and interface identifiers.
pub mod id;
/// Registration instants passed to loader operations.
pub mod when;

pub use contract::ContractId;
pub use id::{Cid, Iid, ParseIdError};
pub use when::When;
