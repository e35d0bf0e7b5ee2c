use dupestore::actions::Disposal;
use dupestore::config::Config;
use dupestore::engine::Dedupe;
use dupestore::ErrorKind;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.batch_size, 20);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
database = "/srv/index/dupes.sqlite"
hash_threads = 8
batch_size = 50
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();

    assert_eq!(config.database, PathBuf::from("/srv/index/dupes.sqlite"));
    assert_eq!(config.hash_threads, 8);
    assert_eq!(config.batch_size, 50);
    // Unset keys keep their defaults
    assert_eq!(config.scan_batch_size, 256);
}

#[test]
fn test_env_overrides_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "scan_batch_size = 10\n").unwrap();

    std::env::set_var("DUPESTORE_SCAN_BATCH_SIZE", "99");
    let config: Config = Config::figment(Some(&config_path)).extract().unwrap();
    std::env::remove_var("DUPESTORE_SCAN_BATCH_SIZE");

    assert_eq!(config.scan_batch_size, 99);
}

#[test]
fn test_invalid_toml_type_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_threads = \"many\"\n").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract();
    assert!(result.is_err());
}

#[test]
fn test_engine_rejects_zero_batch() {
    let temp_dir = tempdir().unwrap();
    let config = Config {
        database: temp_dir.path().join("index.sqlite"),
        batch_size: 0,
        ..Config::default()
    };

    let err = Dedupe::open(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_engine_uses_configured_database() {
    let temp_dir = tempdir().unwrap();
    let data = temp_dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("a.txt"), b"same").unwrap();
    fs::write(data.join("b.txt"), b"same").unwrap();

    let config = Config {
        database: temp_dir.path().join("state").join("index.sqlite"),
        ..Config::default()
    };

    {
        let mut engine = Dedupe::open(config.clone()).unwrap();
        engine.scan(&data).unwrap();
    }

    let engine = Dedupe::open(config).unwrap();
    assert_eq!(engine.duplicate_index().unwrap().len(), 2);
    assert_eq!(
        engine.config().execute_config(Disposal::Delete).batch_size,
        20
    );
}
