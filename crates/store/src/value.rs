use std::fmt;

use serde::{Deserialize, Serialize};

/// A value stored under a key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
	Str(String),
	Int(i64),
	Bytes(Vec<u8>),
}

impl Value {
	pub fn kind(&self) -> ValueKind {
		match self {
			Value::Str(_) => ValueKind::Str,
			Value::Int(_) => ValueKind::Int,
			Value::Bytes(_) => ValueKind::Bytes,
		}
	}
}

/// Discriminant of [`Value`], used in type mismatch diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
	Str,
	Int,
	Bytes,
}

impl fmt::Display for ValueKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ValueKind::Str => "a string",
			ValueKind::Int => "an integer",
			ValueKind::Bytes => "a byte blob",
		})
	}
}
