//! The telemetry backend contract and its variants.
//!
//! A backend does exactly one thing: accept a [`Measurement`] and deliver
//! it somewhere. Each variant is an independent implementation constructed
//! from its own configuration section; no state is shared between variants
//! and no backend retries internally. A failed publish surfaces to the
//! caller, which owns retry policy.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::backend::BackendConfig;

use super::measurement::{DeviceId, Measurement};

pub mod console;
pub mod csv;
pub mod gauth;
pub mod iotcore;
pub mod pubsub;
pub mod sheets;

/// Unified error type for backend construction and publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Local file I/O failed (CSV backend, key files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An HTTP request could not be sent or its response not read.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote service rejected the call.
    #[error("remote call failed with status {status}: {body}")]
    Remote { status: u16, body: String },

    /// Service-account credentials could not be loaded or exchanged.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The IoT Core transport failed.
    #[error(transparent)]
    IotCore(#[from] ::iotcore::IotCoreError),

    /// A timestamp could not be rendered for a row-oriented backend.
    #[error("timestamp formatting failed: {0}")]
    TimestampFormat(#[from] time::error::Format),
}

/// The single capability every backend implements.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Delivers one measurement. Success semantics are backend-specific
    /// (accepted by the client, RPC returned, row written); failure is
    /// always a typed [`PublishError`].
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError>;
}

/// Builds backend instances. Each invocation gets a fresh instance, so
/// construction-time validation runs every cycle and no connection state
/// crosses cycles. The device id was resolved and validated once at
/// startup; backends take it as-is.
pub trait BackendFactory: Send + Sync {
    fn build(&self, device_id: &DeviceId) -> Result<Box<dyn Backend>, PublishError>;
}

impl BackendFactory for BackendConfig {
    fn build(&self, device_id: &DeviceId) -> Result<Box<dyn Backend>, PublishError> {
        from_config(self, device_id)
    }
}

/// Constructs the one backend selected by `config`.
pub fn from_config(
    config: &BackendConfig,
    device_id: &DeviceId,
) -> Result<Box<dyn Backend>, PublishError> {
    let backend: Box<dyn Backend> = match config {
        BackendConfig::IotCoreHttp(c) => Box::new(iotcore::IotCoreHttpBackend::new(c, device_id)?),
        BackendConfig::IotCoreMqtt(c) => Box::new(iotcore::IotCoreMqttBackend::new(c, device_id)?),
        BackendConfig::Pubsub(c) => Box::new(pubsub::PubSubBackend::new(c)?),
        BackendConfig::Sheets(c) => Box::new(sheets::SheetsBackend::new(c)?),
        BackendConfig::Csv(c) => Box::new(csv::CsvBackend::new(c.path.clone())),
        BackendConfig::Stdout(c) => Box::new(console::ConsoleBackend::new(c.record)),
    };
    Ok(backend)
}

/// Shared HTTP client settings for the REST backends.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Arc delegation, so callers can hold onto a backend they also hand out.
#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        (**self).publish(measurement).await
    }
}
