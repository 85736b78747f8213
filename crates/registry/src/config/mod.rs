//! Component manager configuration.
//!
//! Settings come from an optional TOML file, then environment overrides:
//!
//! | Variable | Field |
//! |---|---|
//! | `COMREG_COMPONENT_DIR` | `components_dir` |
//! | `COMREG_STORE` | `store_path` |
//! | `COMREG_NO_AUTOREG` | `no_autoreg` (any value except `0`/`false`) |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENV_COMPONENT_DIR: &str = "COMREG_COMPONENT_DIR";
pub const ENV_STORE: &str = "COMREG_STORE";
pub const ENV_NO_AUTOREG: &str = "COMREG_NO_AUTOREG";

/// Errors from loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid configuration in {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
	/// Directory swept by autoregistration and base of `rel:` locations.
	pub components_dir: PathBuf,
	/// Backing file of the registration store. `None` keeps it in memory.
	pub store_path: Option<PathBuf>,
	/// Upper bound on deferred registration passes per sweep.
	pub max_deferred_passes: usize,
	/// Import the whole store into memory during `init`.
	pub prepopulate_on_init: bool,
	/// Turn autoregistration sweeps into no-ops.
	pub no_autoreg: bool,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			components_dir: default_components_dir(),
			store_path: None,
			max_deferred_passes: 32,
			prepopulate_on_init: false,
			no_autoreg: false,
		}
	}
}

/// `<config dir>/comreg/components`, or `./comreg/components` without a config dir.
pub fn default_components_dir() -> PathBuf {
	dirs::config_dir()
		.unwrap_or_else(|| PathBuf::from("."))
		.join("comreg")
		.join("components")
}

impl ManagerConfig {
	/// Reads `path` (defaults when it does not exist) and applies environment overrides.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let mut config = match std::fs::read_to_string(path) {
			Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
				path: path.to_path_buf(),
				source,
			})?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(path = %path.display(), "no configuration file, using defaults");
				Self::default()
			}
			Err(source) => {
				return Err(ConfigError::Io {
					path: path.to_path_buf(),
					source,
				});
			}
		};
		config.apply_env();
		Ok(config)
	}

	pub fn apply_env(&mut self) {
		self.apply_overrides(|name| std::env::var(name).ok());
	}

	/// Applies overrides from `lookup`, which maps a variable name to its value.
	pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
		if let Some(dir) = lookup(ENV_COMPONENT_DIR).filter(|v| !v.is_empty()) {
			self.components_dir = PathBuf::from(dir);
		}
		if let Some(store) = lookup(ENV_STORE).filter(|v| !v.is_empty()) {
			self.store_path = Some(PathBuf::from(store));
		}
		if let Some(flag) = lookup(ENV_NO_AUTOREG) {
			self.no_autoreg = !matches!(flag.trim(), "0" | "false");
		}
	}
}

#[cfg(test)]
mod tests;
