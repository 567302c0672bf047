//! Device registry coordinates and the strings derived from them.
//!
//! A `DeviceConfig` identifies one device within a Cloud IoT Core registry
//! and knows how to render the composite identifiers the service expects:
//! the MQTT client id, the per-device topics, and the per-device HTTP
//! publish URLs.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::IotCoreError;

/// Signing algorithms accepted by the device bridge.
///
/// Anything outside this set is rejected when the configuration is parsed,
/// before any key is loaded or token minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "ES256")]
    Es256,
}

impl Algorithm {
    pub(crate) fn jwt(self) -> jsonwebtoken::Algorithm {
        match self {
            Algorithm::Rs256 => jsonwebtoken::Algorithm::RS256,
            Algorithm::Es256 => jsonwebtoken::Algorithm::ES256,
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Es256
    }
}

impl FromStr for Algorithm {
    type Err = IotCoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Algorithm::Rs256),
            "ES256" => Ok(Algorithm::Es256),
            other => Err(IotCoreError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Rs256 => write!(f, "RS256"),
            Algorithm::Es256 => write!(f, "ES256"),
        }
    }
}

/// Identifies one device in a Cloud IoT Core registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Cloud project the registry belongs to. Also used as the token
    /// audience claim.
    pub project_id: String,

    /// Device registry id.
    pub registry_id: String,

    /// Cloud region of the registry (e.g. `us-central1`).
    pub region: String,

    /// Registered device id. Validation happens at the identity boundary,
    /// before a `DeviceConfig` is built.
    pub device_id: String,

    /// Path to the device's private key (PEM). The key must have been
    /// registered with the device in IoT Core.
    pub private_key_path: PathBuf,

    /// Algorithm used to sign device tokens.
    #[serde(default)]
    pub algorithm: Algorithm,
}

impl DeviceConfig {
    /// The fully-qualified client id the bridge expects in CONNECT.
    pub fn client_id(&self) -> String {
        format!(
            "projects/{}/locations/{}/registries/{}/devices/{}",
            self.project_id, self.region, self.registry_id, self.device_id
        )
    }

    /// MQTT topic for telemetry events.
    pub fn events_topic(&self) -> String {
        format!("/devices/{}/events", self.device_id)
    }

    /// MQTT topic for device state messages.
    pub fn state_topic(&self) -> String {
        format!("/devices/{}/state", self.device_id)
    }
}

/// Coordinates of the MQTT bridge and the session timing knobs.
///
/// Defaults match the managed bridge; tests point `host`/`port` at a local
/// broker or a mock session instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge hostname.
    pub host: String,

    /// Bridge port. The managed bridge listens on 8883 and 443 only.
    pub port: u16,

    /// MQTT keep-alive interval in seconds.
    pub keep_alive_secs: u64,

    /// Bound on waiting for CONNACK and PUBACK. The underlying transport
    /// would otherwise block indefinitely on a dead peer.
    pub ack_timeout_secs: u64,
}

pub const DEFAULT_BRIDGE_HOST: &str = "mqtt.googleapis.com";
pub const DEFAULT_BRIDGE_PORT: u16 = 8883;

/// Ports the managed bridge accepts connections on.
pub const BRIDGE_PORTS: [u16; 2] = [8883, 443];

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            host: DEFAULT_BRIDGE_HOST.to_string(),
            port: DEFAULT_BRIDGE_PORT,
            keep_alive_secs: 60,
            ack_timeout_secs: 30,
        }
    }
}
