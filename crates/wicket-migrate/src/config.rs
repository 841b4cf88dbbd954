//! Operator configuration loading from file and environment variables.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wicket_db::{DatabaseConfig, Dialect, DATABASE_URL_ENV};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_PATH_ENV: &str = "WICKET_CONFIG_PATH";

/// Top-level configuration for `wicket-migrate`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Where the schema and migration artifacts live.
    #[serde(default)]
    pub migrations: MigrationSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Migration pipeline settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationSettings {
    /// TOML file declaring the schema.
    #[serde(default = "default_schema_path")]
    pub schema: PathBuf,

    /// Directory holding the generated artifacts.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Dialect to generate for. Defaults to the dialect of `database.url`.
    #[serde(default)]
    pub dialect: Option<Dialect>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "wicket_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema.toml")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            schema: default_schema_path(),
            out_dir: default_out_dir(),
            dialect: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies overrides from the process environment.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`], reading overrides through `env` instead of the
/// process environment.
///
/// Environment variable overrides:
/// - `DATABASE_URL` overrides `database.url`
/// - `WICKET_MIGRATIONS_DIR` overrides `migrations.out_dir`
/// - `WICKET_SCHEMA_PATH` overrides `migrations.schema`
/// - `WICKET_LOG_LEVEL` overrides `logging.level`
/// - `WICKET_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: p.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %p.display(), "config file not found, using defaults");
                Config::default()
            }
            Err(source) => {
                return Err(ConfigError::FileRead {
                    path: p.to_path_buf(),
                    source,
                })
            }
        },
        None => Config::default(),
    };

    if let Some(url) = env(DATABASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
        config.database.url = Some(url);
    }
    if let Some(dir) = env("WICKET_MIGRATIONS_DIR") {
        config.migrations.out_dir = PathBuf::from(dir);
    }
    if let Some(schema) = env("WICKET_SCHEMA_PATH") {
        config.migrations.schema = PathBuf::from(schema);
    }
    if let Some(level) = env("WICKET_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = env("WICKET_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_a_file() {
        let config = load_config_with(None, no_env).expect("defaults load");
        assert!(config.database.url.is_none());
        assert_eq!(config.migrations.schema, PathBuf::from("schema.toml"));
        assert_eq!(config.migrations.out_dir, PathBuf::from("migrations"));
        assert_eq!(config.migrations.dialect, None);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_with(Some(&dir.path().join("absent.toml")), no_env)
            .expect("missing file is not an error");
        assert_eq!(config.migrations.out_dir, PathBuf::from("migrations"));
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wicket.toml");
        std::fs::write(
            &path,
            r#"
[database]
url = "sqlite://shop.db"
query_timeout_ms = 2500

[migrations]
schema = "catalog/schema.toml"
out_dir = "db/migrations"
dialect = "sqlite"

[logging]
level = "debug"
json = true
"#,
        )
        .expect("write config");

        let config = load_config_with(Some(&path), no_env).expect("config parses");
        assert_eq!(config.database.url.as_deref(), Some("sqlite://shop.db"));
        assert_eq!(config.database.query_timeout_ms, 2500);
        assert_eq!(config.migrations.schema, PathBuf::from("catalog/schema.toml"));
        assert_eq!(config.migrations.out_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.migrations.dialect, Some(Dialect::Sqlite));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn environment_overrides_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wicket.toml");
        std::fs::write(
            &path,
            "[database]\nurl = \"sqlite://file.db\"\n[migrations]\nout_dir = \"from-file\"\n",
        )
        .expect("write config");

        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite://env.db"),
            ("WICKET_MIGRATIONS_DIR", "from-env"),
            ("WICKET_SCHEMA_PATH", "env-schema.toml"),
            ("WICKET_LOG_LEVEL", "warn"),
            ("WICKET_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();
        let config = load_config_with(Some(&path), |key| env.get(key).map(|v| v.to_string()))
            .expect("config loads");

        assert_eq!(config.database.url.as_deref(), Some("sqlite://env.db"));
        assert_eq!(config.migrations.out_dir, PathBuf::from("from-env"));
        assert_eq!(config.migrations.schema, PathBuf::from("env-schema.toml"));
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json);
    }

    #[test]
    fn blank_database_url_keeps_the_file_value() {
        let config = load_config_with(None, |key| {
            (key == "DATABASE_URL").then(|| "  ".to_string())
        })
        .expect("config loads");
        assert!(config.database.url.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wicket.toml");
        std::fs::write(&path, "[migrations\nschema = ").expect("write config");

        let err = load_config_with(Some(&path), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn postgresql_is_accepted_as_a_dialect_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wicket.toml");
        std::fs::write(&path, "[migrations]\ndialect = \"postgresql\"\n").expect("write config");

        let config = load_config_with(Some(&path), no_env).expect("config parses");
        assert_eq!(config.migrations.dialect, Some(Dialect::Postgres));
    }

    #[test]
    fn unknown_dialect_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wicket.toml");
        std::fs::write(&path, "[migrations]\ndialect = \"mysql\"\n").expect("write config");

        assert!(load_config_with(Some(&path), no_env).is_err());
    }
}
