//! HTTP publish mode.
//!
//! One authenticated POST per publish: mint a token, wrap the payload in a
//! base64 envelope, and hit the device's publish URL. Telemetry events and
//! device state are two distinct message kinds with distinct URLs and
//! envelope shapes; the default flow only sends events, but both are
//! supported here.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use serde_json::json;
use tracing::debug;

use crate::{
    device::DeviceConfig,
    error::IotCoreError,
    token::{TokenSigner, DEFAULT_TOKEN_VALIDITY},
};

pub const DEFAULT_PUBLISH_BASE_URL: &str = "https://cloudiotdevice.googleapis.com/v1";

/// The two message kinds the device endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Telemetry event, forwarded to the registry's event destination.
    Event,
    /// Device state, retained by the registry as the device's last state.
    State,
}

impl MessageKind {
    fn url_verb(self) -> &'static str {
        match self {
            MessageKind::Event => "publishEvent",
            MessageKind::State => "setState",
        }
    }
}

/// Publishes device messages over HTTP with a fresh token per attempt.
#[derive(Debug)]
pub struct HttpPublisher {
    device: DeviceConfig,
    signer: TokenSigner,
    client: reqwest::Client,
    base_url: String,
    token_validity: Duration,
    request_timeout: Duration,
}

impl HttpPublisher {
    /// Builds a publisher for `device` against the managed endpoint.
    ///
    /// Fails if the device key cannot be loaded; a bad key path is a
    /// configuration error and surfaces here rather than at publish time.
    pub fn new(device: DeviceConfig) -> Result<Self, IotCoreError> {
        let signer = TokenSigner::new(&device)?;
        Ok(HttpPublisher {
            device,
            signer,
            client: reqwest::Client::new(),
            base_url: DEFAULT_PUBLISH_BASE_URL.to_string(),
            token_validity: DEFAULT_TOKEN_VALIDITY,
            request_timeout: Duration::from_secs(30),
        })
    }

    /// Overrides the endpoint base URL. Tests point this at a local server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the token validity window.
    pub fn with_token_validity(mut self, validity: Duration) -> Self {
        self.token_validity = validity;
        self
    }

    /// Overrides the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn publish_url(&self, kind: MessageKind) -> String {
        format!(
            "{}/projects/{}/locations/{}/registries/{}/devices/{}:{}",
            self.base_url,
            self.device.project_id,
            self.device.region,
            self.device.registry_id,
            self.device.device_id,
            kind.url_verb()
        )
    }

    fn envelope(kind: MessageKind, payload: &[u8]) -> serde_json::Value {
        let encoded = URL_SAFE.encode(payload);
        match kind {
            MessageKind::Event => json!({ "binary_data": encoded }),
            MessageKind::State => json!({ "state": { "binary_data": encoded } }),
        }
    }

    /// Publishes a telemetry event.
    pub async fn publish(&self, payload: &[u8]) -> Result<(), IotCoreError> {
        self.publish_message(MessageKind::Event, payload).await
    }

    /// Publishes a device state message.
    pub async fn publish_state(&self, payload: &[u8]) -> Result<(), IotCoreError> {
        self.publish_message(MessageKind::State, payload).await
    }

    async fn publish_message(
        &self,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), IotCoreError> {
        let token = self.signer.mint(self.token_validity)?;
        let url = self.publish_url(kind);

        debug!("publishing {} bytes to {url}", payload.len());

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .header("cache-control", "no-cache")
            .timeout(self.request_timeout)
            .json(&Self::envelope(kind, payload))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IotCoreError::Publish {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::device::Algorithm;

    const DEVICE_PATH: &str =
        "/projects/my-project/locations/us-central1/registries/my-registry/devices/sensor-01";

    fn publisher(base_url: &str) -> HttpPublisher {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("sensor-01.pem");
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        let device = DeviceConfig {
            project_id: "my-project".into(),
            registry_id: "my-registry".into(),
            region: "us-central1".into(),
            device_id: "sensor-01".into(),
            private_key_path: key_path,
            algorithm: Algorithm::Es256,
        };

        // TempDir is dropped here; the key was already loaded at construction.
        HttpPublisher::new(device)
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    #[tokio::test]
    async fn event_publish_hits_the_event_url_with_bearer_auth() {
        let mut server = mockito::Server::new_async().await;
        let publisher = publisher(&server.url());

        let mock = server
            .mock("POST", format!("{DEVICE_PATH}:publishEvent").as_str())
            .match_header("authorization", Matcher::Regex("^Bearer .+".into()))
            .match_header("content-type", "application/json")
            .match_header("cache-control", "no-cache")
            .match_body(Matcher::Json(json!({
                "binary_data": URL_SAFE.encode(b"payload"),
            })))
            .with_status(200)
            .create_async()
            .await;

        publisher.publish(b"payload").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn state_publish_nests_the_envelope_under_state() {
        let mut server = mockito::Server::new_async().await;
        let publisher = publisher(&server.url());

        let mock = server
            .mock("POST", format!("{DEVICE_PATH}:setState").as_str())
            .match_body(Matcher::Json(json!({
                "state": { "binary_data": URL_SAFE.encode(b"payload") },
            })))
            .with_status(200)
            .create_async()
            .await;

        publisher.publish_state(b"payload").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_surfaces_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let publisher = publisher(&server.url());

        let mock = server
            .mock("POST", format!("{DEVICE_PATH}:publishEvent").as_str())
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let err = publisher.publish(b"payload").await.unwrap_err();
        match err {
            IotCoreError::Publish { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("expected publish error, got {other:?}"),
        }
        mock.assert_async().await;
    }
}
