use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Failure to parse an identifier from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier {input:?}: {reason}")]
pub struct ParseIdError {
	pub input: String,
	pub reason: String,
}

macro_rules! define_id {
	($(#[$attr:meta])* $name:ident) => {
		$(#[$attr])*
		#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
		pub struct $name(Uuid);

		impl $name {
			/// The all-zero identifier.
			pub const NULL: Self = Self(Uuid::nil());

			/// Builds an identifier from its big-endian 128-bit value.
			pub const fn from_u128(value: u128) -> Self {
				Self(Uuid::from_u128(value))
			}

			pub const fn from_bytes(bytes: [u8; 16]) -> Self {
				Self(Uuid::from_bytes(bytes))
			}

			pub const fn as_bytes(&self) -> &[u8; 16] {
				self.0.as_bytes()
			}

			pub fn is_null(&self) -> bool {
				self.0.is_nil()
			}

			/// Parses braced (`{...}`), hyphenated, urn or simple forms.
			pub fn parse(input: &str) -> Result<Self, ParseIdError> {
				Uuid::parse_str(input.trim())
					.map(Self)
					.map_err(|e| ParseIdError {
						input: input.to_string(),
						reason: e.to_string(),
					})
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				fmt::Display::fmt(&self.0.braced(), f)
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, concat!(stringify!($name), "({})"), self.0.braced())
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::parse(s)
			}
		}

		impl From<Uuid> for $name {
			fn from(value: Uuid) -> Self {
				Self(value)
			}
		}
	};
}

define_id! {
	/// Class identifier: names exactly one implementation.
	///
	/// [`Cid::NULL`] means "no class" and is never a valid registration key.
	Cid
}

define_id! {
	/// Interface identifier requested from a factory or object.
	Iid
}

impl Iid {
	/// Base interface every object answers to.
	pub const SUPPORTS: Self = Self::from_u128(0x00000000_0000_0000_c000_000000000046);
	/// The class object (factory) interface.
	pub const FACTORY: Self = Self::from_u128(0x00000001_0000_0000_c000_000000000046);
}
