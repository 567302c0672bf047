//! Pub/sub topic backend.
//!
//! Hands the encoded measurement to the topic's publish endpoint,
//! fire-and-forget: success means the publish RPC was accepted, not that
//! any subscriber saw the message.

use base64::{engine::general_purpose::STANDARD, Engine};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::{config::backend::PubSubConfig, core::measurement::Measurement};

use super::{gauth::ServiceAccountAuth, http_client, Backend, PublishError};

const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";
const DEFAULT_BASE_URL: &str = "https://pubsub.googleapis.com/v1";

pub struct PubSubBackend {
    project_id: String,
    topic: String,
    auth: ServiceAccountAuth,
    client: reqwest::Client,
    base_url: String,
}

impl PubSubBackend {
    pub fn new(config: &PubSubConfig) -> Result<Self, PublishError> {
        let auth = ServiceAccountAuth::from_keyfile(&config.keyfile, PUBSUB_SCOPE)?;
        Ok(PubSubBackend {
            project_id: config.project_id.clone(),
            topic: config.topic.clone(),
            auth,
            client: http_client(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn for_tests(base_url: &str) -> Self {
        PubSubBackend {
            project_id: "my-project".into(),
            topic: "telemetry".into(),
            auth: ServiceAccountAuth::fixed("test-token"),
            client: http_client(),
            base_url: base_url.to_string(),
        }
    }

    fn publish_url(&self) -> String {
        format!(
            "{}/projects/{}/topics/{}:publish",
            self.base_url, self.project_id, self.topic
        )
    }
}

#[async_trait]
impl Backend for PubSubBackend {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        let token = self.auth.access_token(&self.client).await?;
        let url = self.publish_url();

        debug!("publishing measurement to {url}");

        let body = json!({
            "messages": [{ "data": STANDARD.encode(measurement.encode()) }],
        });

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {token}"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
