//! Device-side publishing to Google Cloud IoT Core.
//!
//! Two transport modes share one authentication primitive: a short-lived
//! JWT signed with the device's registered private key.
//!
//! * [`HttpPublisher`] — one authenticated POST per publish, with the
//!   payload wrapped in a base64 envelope. Fresh token per attempt.
//! * [`MqttPublisher`] — a per-attempt TLS bridge session: connect with the
//!   token as the CONNECT password, publish at QoS 1, disconnect. One token
//!   per session; the trust-root bundle is cached on disk and reused across
//!   invocations.
//!
//! Neither mode retries. A failed publish surfaces as [`IotCoreError`] and
//! the caller decides whether and when to try again.
//!
//! ```ignore
//! use iotcore::{DeviceConfig, HttpPublisher};
//!
//! let publisher = HttpPublisher::new(device_config)?;
//! publisher.publish(&encoded_measurement).await?;
//! ```

pub mod device;
pub mod error;
pub mod http;
pub mod mqtt;
pub mod roots;
pub mod session;
pub mod token;

pub use device::{Algorithm, BridgeConfig, DeviceConfig, BRIDGE_PORTS};
pub use error::IotCoreError;
pub use http::{HttpPublisher, MessageKind};
pub use mqtt::MqttPublisher;
pub use roots::TrustRoots;
pub use token::{TokenSigner, DEFAULT_TOKEN_VALIDITY};

/// Result alias for IoT Core operations.
pub type Result<T> = std::result::Result<T, IotCoreError>;
