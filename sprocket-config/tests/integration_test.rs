//! Integration tests for sprocket-config

use sprocket_config::*;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use temp_env::with_vars;

#[test]
fn test_default_config_validation() {
    let config = SprocketConfig::default();
    assert!(config.validate_all().is_ok());
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("SPROCKET_LOG_LEVEL", Some("debug")),
        ("SPROCKET_LOG_FORMAT", Some("json")),
        ("SPROCKET_FETCH_MAX_ATTEMPTS", Some("7")),
        ("SPROCKET_FETCH_INITIAL_BACKOFF_MS", Some("50")),
        ("SPROCKET_STORAGE_BACKEND", Some("redis")),
        ("SPROCKET_REDIS_URL", Some("redis://cache.internal:6379")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.fetch.max_attempts, 7);
        assert_eq!(config.fetch.initial_backoff, Duration::from_millis(50));
        assert_eq!(
            config.storage.backend,
            StorageBackend::Redis {
                url: "redis://cache.internal:6379".to_string(),
                bucket_separator: "/".to_string(),
            }
        );
    });
}

#[test]
fn test_filesystem_root_override() {
    let vars = vec![
        ("SPROCKET_STORAGE_BACKEND", Some("filesystem")),
        ("SPROCKET_FILESYSTEM_ROOT", Some("/srv/blobs")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();
        assert_eq!(
            config.storage.backend,
            StorageBackend::Filesystem {
                root: PathBuf::from("/srv/blobs")
            }
        );
    });
}

#[test]
fn test_invalid_env_values_are_rejected() {
    with_vars(vec![("SPROCKET_FETCH_MAX_ATTEMPTS", Some("many"))], || {
        assert!(matches!(
            ConfigLoader::new().from_env(),
            Err(ConfigError::EnvError(_))
        ));
    });

    with_vars(vec![("SPROCKET_STORAGE_BACKEND", Some("s3"))], || {
        assert!(ConfigLoader::new().from_env().is_err());
    });

    with_vars(vec![("SPROCKET_FETCH_MAX_ATTEMPTS", Some("0"))], || {
        assert!(matches!(
            ConfigLoader::new().from_env(),
            Err(ConfigError::DomainError { .. })
        ));
    });
}

#[test]
fn test_yaml_config_file() {
    let yaml = r#"
storage:
  backend:
    type: memory

fetch:
  max_attempts: 3
  initial_backoff: 100
  max_backoff: 5
  retry_missing_keys: false

logging:
  level: warn
  format: compact
"#;

    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    with_vars(Vec::<(&str, Option<&str>)>::new(), || {
        let config = ConfigLoader::new().from_file(file.path()).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.fetch.initial_backoff, Duration::from_millis(100));
        assert_eq!(config.fetch.max_backoff, Duration::from_secs(5));
        assert!(!config.fetch.retry_missing_keys);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Compact);
    });
}

#[test]
fn test_json_config_file_with_env_override() {
    let json = r#"{"logging": {"level": "info"}, "fetch": {"max_attempts": 2}}"#;

    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    with_vars(vec![("SPROCKET_LOG_LEVEL", Some("trace"))], || {
        let config = ConfigLoader::new().load(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, LogLevel::Trace);
        assert_eq!(config.fetch.max_attempts, 2);
    });
}

#[test]
fn test_sample_config_parses_back() {
    let sample = SprocketConfig::generate_sample();
    let parsed: SprocketConfig = serde_yaml::from_str(&sample).unwrap();
    assert!(parsed.validate_all().is_ok());
}
