//! Configuration loading and database path resolution
//!
//! Uses serial_test: tests touching CATCLASS_* environment variables must not
//! run in parallel.

use catclass_common::config::{
    load_toml_config, resolve_database_path, TomlConfig, CONFIG_ENV_VAR, DATABASE_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_wins_over_everything() {
    env::set_var(DATABASE_ENV_VAR, "/tmp/catclass-env.db");
    let config = TomlConfig {
        database_path: Some(PathBuf::from("/tmp/catclass-toml.db")),
        ..Default::default()
    };

    let path = resolve_database_path(Some(Path::new("/tmp/catclass-cli.db")), &config);
    assert_eq!(path, PathBuf::from("/tmp/catclass-cli.db"));

    env::remove_var(DATABASE_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_wins_over_toml() {
    env::set_var(DATABASE_ENV_VAR, "/tmp/catclass-env.db");
    let config = TomlConfig {
        database_path: Some(PathBuf::from("/tmp/catclass-toml.db")),
        ..Default::default()
    };

    let path = resolve_database_path(None, &config);
    assert_eq!(path, PathBuf::from("/tmp/catclass-env.db"));

    env::remove_var(DATABASE_ENV_VAR);
}

#[test]
#[serial]
fn test_toml_used_when_no_overrides() {
    env::remove_var(DATABASE_ENV_VAR);
    let config = TomlConfig {
        database_path: Some(PathBuf::from("/tmp/catclass-toml.db")),
        ..Default::default()
    };

    let path = resolve_database_path(None, &config);
    assert_eq!(path, PathBuf::from("/tmp/catclass-toml.db"));
}

#[test]
#[serial]
fn test_compiled_default_ends_with_catalog_db() {
    env::remove_var(DATABASE_ENV_VAR);

    let path = resolve_database_path(None, &TomlConfig::default());
    assert!(path.ends_with("catalog.db"));
}

#[test]
#[serial]
fn test_explicit_config_file_is_loaded() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("catclass.toml");
    std::fs::write(
        &config_path,
        r#"
        database_path = "/data/catalog.db"

        [logging]
        level = "debug"

        [classifier]
        page_size = 500
        workers = 4

        [rule_source]
        delimiter = ";"
        "#,
    )
    .unwrap();

    let config = load_toml_config(Some(&config_path)).unwrap();
    assert_eq!(config.database_path, Some(PathBuf::from("/data/catalog.db")));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.classifier.page_size, 500);
    assert_eq!(config.classifier.workers, 4);
    assert_eq!(config.rule_source.delimiter, ';');
}

#[test]
#[serial]
fn test_config_env_var_points_at_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("env.toml");
    std::fs::write(&config_path, "[classifier]\npage_size = 42\n").unwrap();
    env::set_var(CONFIG_ENV_VAR, &config_path);

    let config = load_toml_config(None).unwrap();
    assert_eq!(config.classifier.page_size, 42);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_explicit_config_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = load_toml_config(Some(Path::new("/nonexistent/catclass/config.toml")));
    assert!(result.is_err());
}
