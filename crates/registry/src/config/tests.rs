use std::collections::HashMap;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use serial_test::serial;

use super::*;

#[test]
fn test_defaults() {
	let config = ManagerConfig::default();
	assert_eq!(config.max_deferred_passes, 32);
	assert!(!config.prepopulate_on_init);
	assert!(!config.no_autoreg);
	assert_eq!(config.store_path, None);
	assert!(config.components_dir.ends_with("comreg/components"));
}

#[test]
fn test_partial_toml_keeps_defaults() {
	let config: ManagerConfig = toml::from_str(
		r#"
		components_dir = "/srv/components"
		max_deferred_passes = 4
		"#,
	)
	.unwrap();
	assert_eq!(config.components_dir, PathBuf::from("/srv/components"));
	assert_eq!(config.max_deferred_passes, 4);
	assert!(!config.no_autoreg);
}

#[test]
fn test_unknown_field_rejected() {
	assert!(toml::from_str::<ManagerConfig>("component_dir = \"/typo\"").is_err());
}

#[test]
fn test_overrides() {
	let vars: HashMap<&str, &str> = [(ENV_COMPONENT_DIR, "/env/dir"), (ENV_STORE, "/env/store.bin"), (ENV_NO_AUTOREG, "1")].into();
	let mut config = ManagerConfig::default();
	config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

	assert_eq!(config.components_dir, PathBuf::from("/env/dir"));
	assert_eq!(config.store_path, Some(PathBuf::from("/env/store.bin")));
	assert!(config.no_autoreg);
}

#[test]
fn test_no_autoreg_false_values() {
	for value in ["0", "false"] {
		let mut config = ManagerConfig {
			no_autoreg: true,
			..ManagerConfig::default()
		};
		config.apply_overrides(|name| (name == ENV_NO_AUTOREG).then(|| value.to_string()));
		assert!(!config.no_autoreg, "{value}");
	}
}

#[test]
#[serial]
fn test_load_missing_file_uses_env() {
	let dir = tempfile::tempdir().unwrap();
	// SAFETY: serialized with every other test touching the environment.
	unsafe {
		std::env::set_var(ENV_COMPONENT_DIR, "/from/env");
		std::env::remove_var(ENV_STORE);
		std::env::remove_var(ENV_NO_AUTOREG);
	}
	let config = ManagerConfig::load(&dir.path().join("absent.toml"));
	unsafe {
		std::env::remove_var(ENV_COMPONENT_DIR);
	}

	assert_eq!(config.unwrap().components_dir, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_load_reports_parse_errors() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("comreg.toml");
	std::fs::write(&path, "max_deferred_passes = \"many\"").unwrap();

	let err = ManagerConfig::load(&path).unwrap_err();
	assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
}
