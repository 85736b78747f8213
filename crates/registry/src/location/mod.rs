//! Textual module locations.
//!
//! Locations are what the registry stores in place of paths, so that a
//! components directory can move without invalidating its records:
//!
//! - `rel:<path>`: relative to the components directory, `/`-separated.
//! - `abs:<path>`: absolute path outside the components directory.
//! - `lib:<name>`: bare library name resolved by the platform search path.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ComponentError, Result};

const ABS: &str = "abs:";
const REL: &str = "rel:";
const LIB: &str = "lib:";

/// Where a module lives.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Location {
	Abs(String),
	Rel(String),
	Lib(String),
}

impl Location {
	/// Parses the encoded `prefix:value` form.
	pub fn parse(encoded: &str) -> Result<Self> {
		let invalid = || ComponentError::InvalidLocation(encoded.to_string());
		let (ctor, rest): (fn(String) -> Self, &str) = if let Some(rest) = encoded.strip_prefix(ABS) {
			(Location::Abs, rest)
		} else if let Some(rest) = encoded.strip_prefix(REL) {
			(Location::Rel, rest)
		} else if let Some(rest) = encoded.strip_prefix(LIB) {
			(Location::Lib, rest)
		} else {
			return Err(invalid());
		};
		if rest.is_empty() {
			return Err(invalid());
		}
		Ok(ctor(rest.to_string()))
	}

	/// Encodes `path` relative to `components_dir` when it lies inside it.
	pub fn from_path(path: &Path, components_dir: &Path) -> Self {
		match path.strip_prefix(components_dir) {
			Ok(rel) if !rel.as_os_str().is_empty() => {
				let segments: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
				Location::Rel(segments.join("/"))
			}
			_ => Location::Abs(path.to_string_lossy().into_owned()),
		}
	}

	/// Turns the location back into something the platform loader accepts.
	pub fn resolve(&self, components_dir: &Path) -> PathBuf {
		match self {
			Location::Abs(path) => PathBuf::from(path),
			Location::Rel(rel) => rel.split('/').fold(components_dir.to_path_buf(), |acc, seg| acc.join(seg)),
			Location::Lib(name) => PathBuf::from(name),
		}
	}

	/// ASCII case-insensitive comparison of the encoded forms.
	pub fn eq_ignore_case(&self, other: &Location) -> bool {
		self.to_string().eq_ignore_ascii_case(&other.to_string())
	}
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let (prefix, value) = match self {
			Location::Abs(v) => (ABS, v),
			Location::Rel(v) => (REL, v),
			Location::Lib(v) => (LIB, v),
		};
		write!(f, "{prefix}{value}")
	}
}

impl fmt::Debug for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Location({self})")
	}
}

impl std::str::FromStr for Location {
	type Err = ComponentError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}
