//! Application configuration loading and validation.
//!
//! The top-level `Config` aggregates logging, sampling, and backend
//! selection. It is loaded from a TOML file once at startup, validated,
//! and treated as immutable from then on.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{backend::BackendConfig, logger::LoggerConfig, sampling::SamplingConfig};

pub mod backend;
pub mod logger;
pub mod sampling;

/// Timestamped startup messages for the window before the tracing
/// subscriber exists. Configuration loading runs in that window.
#[macro_export]
macro_rules! early_print {
    ($label:expr, $($arg:tt)*) => {
        println!(
            "{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap()
            )
            .dim(),
            $label,
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::early_print!(console::style("INFO").green(), $($arg)*)
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::early_print!(console::style("WARN").yellow(), $($arg)*)
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::early_print!(console::style("ERROR").red(), $($arg)*)
    };
}

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "TEMPLOG_CONFIG";

/// Fallback path when the environment variable is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/templog/config.toml";

/// Errors during configuration loading, parsing, or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No configuration file could be located.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error while reading the configuration file.
    #[error("io error while reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("parse error while reading configuration: {0}")]
    Parse(String),

    /// The parsed configuration failed validation.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    /// Logging subsystem configuration.
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Sampling schedule.
    #[validate(nested)]
    pub sampling: SamplingConfig,

    /// The one backend this invocation publishes to.
    #[validate(nested)]
    pub backend: BackendConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if no file is found or it cannot be read,
    /// parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;
        Self::load(&config_path)
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. `TEMPLOG_CONFIG` environment variable
    /// 2. `/etc/templog/config.toml`
    fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(config_path);
            print_info!("using config from {CONFIG_ENV_VAR}: {}", path.display());
            return Ok(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(
            "no configuration file found".to_string(),
        ))
    }

    /// Loads and validates configuration from `path`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "configuration file does not exist: {}",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        print_info!("loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn empty_file_yields_the_default_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(&dir, "");

        let config = Config::load(&path).unwrap();
        assert!(matches!(config.backend, BackendConfig::Stdout(_)));
        assert_eq!(config.sampling.num_samples, 1);
        assert_eq!(config.logger.level, "info");
    }

    #[test]
    fn full_config_round_trips_through_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [logger]
            level = "debug"

            [sampling]
            num_samples = 3
            sample_interval_secs = 1
            collection_interval_secs = 60

            [backend]
            type = "csv"
            path = "/var/log/templog.csv"
            "#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.logger.level, "debug");
        assert_eq!(config.sampling.num_samples, 3);
        assert!(matches!(config.backend, BackendConfig::Csv(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Path::new("/no/such/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Config(_)));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(&dir, "logger = not toml at all");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_values_are_a_validation_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [logger]
            level = "loud"
            "#,
        );

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn backend_validation_is_reached_through_the_top_level() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [backend]
            type = "iotcore_http"
            project_id = "my-project"
            registry_id = "my-registry"
            private_key_path = "/etc/keys/sensor-01.pem"
            "#,
        );

        // Neither device_id nor device_id_from_cert was chosen.
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
