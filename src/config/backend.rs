//! Backend selection and per-backend configuration.
//!
//! Exactly one backend is configured per invocation via the `[backend]`
//! table's `type` key. Each variant owns its full construction-time
//! configuration; there is no shared backend state. What used to be
//! module-level constants in comparable agents (default region, token
//! validity, bridge coordinates) are plain defaulted fields here so tests
//! can override them without process-wide state.

use std::path::PathBuf;

use iotcore::BRIDGE_PORTS;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::core::identity::IdentitySource;

pub const DEFAULT_CLOUD_REGION: &str = "us-central1";
pub const DEFAULT_SHEET_RANGE: &str = "Sheet1";
pub const DEFAULT_STDOUT_DEVICE_ID: &str = "device";

fn default_cloud_region() -> String {
    DEFAULT_CLOUD_REGION.to_string()
}

fn default_token_validity_minutes() -> u64 {
    60
}

fn default_bridge_host() -> String {
    iotcore::device::DEFAULT_BRIDGE_HOST.to_string()
}

fn default_bridge_port() -> u16 {
    iotcore::device::DEFAULT_BRIDGE_PORT
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_ack_timeout_secs() -> u64 {
    30
}

fn default_roots_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/templog")
}

fn default_roots_url() -> String {
    iotcore::roots::DEFAULT_ROOTS_URL.to_string()
}

fn default_publish_base_url() -> String {
    iotcore::http::DEFAULT_PUBLISH_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_sheet_range() -> String {
    DEFAULT_SHEET_RANGE.to_string()
}

fn default_stdout_device_id() -> String {
    DEFAULT_STDOUT_DEVICE_ID.to_string()
}

/// The selected telemetry backend and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Cloud IoT Core over HTTP.
    IotCoreHttp(IotCoreHttpConfig),

    /// Cloud IoT Core over an MQTT bridge session.
    IotCoreMqtt(IotCoreMqttConfig),

    /// Generic pub/sub topic publish.
    Pubsub(PubSubConfig),

    /// Spreadsheet row append.
    Sheets(SheetsConfig),

    /// Local CSV file append.
    Csv(CsvConfig),

    /// Console stream.
    Stdout(StdoutConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Stdout(StdoutConfig::default())
    }
}

impl BackendConfig {
    /// Short name used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            BackendConfig::IotCoreHttp(_) => "iotcore-http",
            BackendConfig::IotCoreMqtt(_) => "iotcore-mqtt",
            BackendConfig::Pubsub(_) => "pubsub",
            BackendConfig::Sheets(_) => "sheets",
            BackendConfig::Csv(_) => "csv",
            BackendConfig::Stdout(_) => "stdout",
        }
    }

    /// Where the device id for this backend comes from.
    ///
    /// Backends with no id of their own fall back to the fixed default id;
    /// only the IoT Core backends support certificate-derived identity.
    pub fn identity(&self) -> IdentitySource {
        match self {
            BackendConfig::IotCoreHttp(c) => c.core.identity(),
            BackendConfig::IotCoreMqtt(c) => c.core.identity(),
            BackendConfig::Pubsub(c) => IdentitySource::Explicit(c.device_id.clone()),
            BackendConfig::Stdout(c) => IdentitySource::Explicit(c.device_id.clone()),
            BackendConfig::Sheets(_) | BackendConfig::Csv(_) => {
                IdentitySource::Explicit(DEFAULT_STDOUT_DEVICE_ID.to_string())
            }
        }
    }
}

impl Validate for BackendConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            BackendConfig::IotCoreHttp(c) => {
                c.validate()?;
                c.core.validate_identity_choice()
            }
            BackendConfig::IotCoreMqtt(c) => {
                c.validate()?;
                c.core.validate_identity_choice()?;
                c.validate_bridge_port()
            }
            BackendConfig::Pubsub(c) => c.validate(),
            BackendConfig::Sheets(c) => c.validate(),
            BackendConfig::Csv(c) => c.validate(),
            BackendConfig::Stdout(c) => c.validate(),
        }
    }
}

fn single_error(field: &'static str, code: &'static str, message: &str) -> ValidationErrors {
    let mut error = ValidationError::new(code);
    error.message = Some(message.to_string().into());
    let mut errors = ValidationErrors::new();
    errors.add(field, error);
    errors
}

/// Settings shared by both IoT Core transports.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IotCoreConfig {
    #[validate(length(min = 1, message = "project_id must not be empty"))]
    pub project_id: String,

    #[validate(length(min = 1, message = "registry_id must not be empty"))]
    pub registry_id: String,

    #[serde(default = "default_cloud_region")]
    pub cloud_region: String,

    /// Device private key (PEM). Read at backend construction.
    pub private_key_path: PathBuf,

    /// Token signing algorithm; anything outside {RS256, ES256} is
    /// rejected when the configuration is parsed.
    #[serde(default)]
    pub algorithm: iotcore::Algorithm,

    /// Explicit device id. Mutually exclusive with `device_id_from_cert`.
    #[serde(default)]
    pub device_id: Option<String>,

    /// Derive the device id from the certificate sitting next to the
    /// private key.
    #[serde(default)]
    pub device_id_from_cert: bool,

    #[serde(default = "default_token_validity_minutes")]
    #[validate(range(min = 1, message = "token validity must be at least one minute"))]
    pub token_validity_minutes: u64,
}

impl IotCoreConfig {
    fn identity(&self) -> IdentitySource {
        match &self.device_id {
            Some(id) => IdentitySource::Explicit(id.clone()),
            None => IdentitySource::Certificate {
                key_path: self.private_key_path.clone(),
            },
        }
    }

    /// Exactly one identity source must be selected.
    fn validate_identity_choice(&self) -> Result<(), ValidationErrors> {
        match (&self.device_id, self.device_id_from_cert) {
            (Some(_), true) => Err(single_error(
                "device_id",
                "identity_choice",
                "device_id and device_id_from_cert are mutually exclusive",
            )),
            (None, false) => Err(single_error(
                "device_id",
                "identity_choice",
                "one of device_id or device_id_from_cert is required",
            )),
            _ => Ok(()),
        }
    }

    /// Builds the device coordinates once the id has been resolved.
    pub fn device(&self, device_id: &crate::core::measurement::DeviceId) -> iotcore::DeviceConfig {
        iotcore::DeviceConfig {
            project_id: self.project_id.clone(),
            registry_id: self.registry_id.clone(),
            region: self.cloud_region.clone(),
            device_id: device_id.as_str().to_string(),
            private_key_path: self.private_key_path.clone(),
            algorithm: self.algorithm,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IotCoreHttpConfig {
    #[serde(flatten)]
    #[validate(nested)]
    pub core: IotCoreConfig,

    /// Device endpoint base URL. Tests point this at a local server.
    #[serde(default = "default_publish_base_url")]
    pub publish_base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IotCoreMqttConfig {
    #[serde(flatten)]
    #[validate(nested)]
    pub core: IotCoreConfig,

    #[serde(default = "default_bridge_host")]
    #[validate(length(min = 1, message = "bridge_host must not be empty"))]
    pub bridge_host: String,

    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_ack_timeout_secs")]
    #[validate(range(min = 1, message = "ack timeout must be at least one second"))]
    pub ack_timeout_secs: u64,

    /// Directory the trust-root bundle is cached in.
    #[serde(default = "default_roots_cache_dir")]
    pub roots_cache_dir: PathBuf,

    /// Well-known URL the bundle is fetched from on first use.
    #[serde(default = "default_roots_url")]
    pub roots_url: String,
}

impl IotCoreMqttConfig {
    /// The managed bridge only listens on the known ports.
    fn validate_bridge_port(&self) -> Result<(), ValidationErrors> {
        if BRIDGE_PORTS.contains(&self.bridge_port) {
            Ok(())
        } else {
            Err(single_error(
                "bridge_port",
                "bridge_port",
                &format!("bridge port must be one of {BRIDGE_PORTS:?}"),
            ))
        }
    }

    pub fn bridge(&self) -> iotcore::BridgeConfig {
        iotcore::BridgeConfig {
            host: self.bridge_host.clone(),
            port: self.bridge_port,
            keep_alive_secs: self.keep_alive_secs,
            ack_timeout_secs: self.ack_timeout_secs,
        }
    }

    pub fn roots(&self) -> iotcore::TrustRoots {
        iotcore::TrustRoots {
            cache_dir: self.roots_cache_dir.clone(),
            url: self.roots_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PubSubConfig {
    #[validate(length(min = 1, message = "project_id must not be empty"))]
    pub project_id: String,

    #[validate(length(min = 1, message = "topic must not be empty"))]
    pub topic: String,

    #[validate(length(min = 1, message = "device_id must not be empty"))]
    pub device_id: String,

    /// Service-account JSON key file.
    pub keyfile: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SheetsConfig {
    /// Service-account JSON key file. The sheet must be shared with the
    /// service account's email address.
    pub keyfile: PathBuf,

    #[validate(length(min = 1, message = "spreadsheet_id must not be empty"))]
    pub spreadsheet_id: String,

    /// A1-notation range rows are appended to.
    #[serde(default = "default_sheet_range")]
    pub range: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CsvConfig {
    /// File rows are appended to. A header row is written once, when the
    /// file is created or found empty.
    pub path: PathBuf,
}

impl Default for CsvConfig {
    fn default() -> Self {
        CsvConfig {
            path: PathBuf::from("templog.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StdoutConfig {
    /// Print the human-readable record instead of the CSV line.
    pub record: bool,

    /// Device id carried by the record output.
    pub device_id: String,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        StdoutConfig {
            record: false,
            device_id: default_stdout_device_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iotcore_toml(extra: &str) -> String {
        format!(
            r#"
            type = "iotcore_mqtt"
            project_id = "my-project"
            registry_id = "my-registry"
            private_key_path = "/etc/keys/sensor-01.pem"
            {extra}
            "#
        )
    }

    #[test]
    fn stdout_is_the_default_backend() {
        assert!(matches!(
            BackendConfig::default(),
            BackendConfig::Stdout(_)
        ));
    }

    #[test]
    fn mqtt_backend_parses_with_defaults() {
        let config: BackendConfig =
            toml::from_str(&iotcore_toml("device_id = \"sensor-01\"")).unwrap();
        config.validate().unwrap();

        let BackendConfig::IotCoreMqtt(c) = config else {
            panic!("expected mqtt variant");
        };
        assert_eq!(c.core.cloud_region, DEFAULT_CLOUD_REGION);
        assert_eq!(c.bridge_host, "mqtt.googleapis.com");
        assert_eq!(c.bridge_port, 8883);
        assert_eq!(c.core.token_validity_minutes, 60);
    }

    #[test]
    fn both_identity_sources_is_a_config_error() {
        let config: BackendConfig = toml::from_str(&iotcore_toml(
            "device_id = \"sensor-01\"\ndevice_id_from_cert = true",
        ))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn neither_identity_source_is_a_config_error() {
        let config: BackendConfig = toml::from_str(&iotcore_toml("")).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bridge_port_outside_the_allow_list_is_rejected() {
        let config: BackendConfig = toml::from_str(&iotcore_toml(
            "device_id = \"sensor-01\"\nbridge_port = 1883",
        ))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unsupported_algorithm_is_rejected_at_parse_time() {
        let result: Result<BackendConfig, _> = toml::from_str(&iotcore_toml(
            "device_id = \"sensor-01\"\nalgorithm = \"HS256\"",
        ));
        assert!(result.is_err());
    }

    #[test]
    fn identity_prefers_the_explicit_id() {
        let config: BackendConfig =
            toml::from_str(&iotcore_toml("device_id = \"sensor-01\"")).unwrap();
        assert_eq!(
            config.identity(),
            IdentitySource::Explicit("sensor-01".into())
        );

        let config: BackendConfig =
            toml::from_str(&iotcore_toml("device_id_from_cert = true")).unwrap();
        assert_eq!(
            config.identity(),
            IdentitySource::Certificate {
                key_path: PathBuf::from("/etc/keys/sensor-01.pem")
            }
        );
    }

    #[test]
    fn csv_and_sheets_fall_back_to_the_default_id() {
        let config: BackendConfig = toml::from_str(
            r#"
            type = "csv"
            path = "/var/log/templog.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.identity(), IdentitySource::Explicit("device".into()));
    }

    #[test]
    fn pubsub_requires_its_fields() {
        let config: BackendConfig = toml::from_str(
            r#"
            type = "pubsub"
            project_id = "my-project"
            topic = ""
            device_id = "sensor-01"
            keyfile = "/etc/keys/service-account.json"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
