//! Spreadsheet append backend.
//!
//! Appends one row per measurement to an A1-notation range: the timestamp
//! in the first column, one column per reading after it. Success means the
//! append RPC returned without error.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{config::backend::SheetsConfig, core::measurement::Measurement};

use super::{gauth::ServiceAccountAuth, http_client, Backend, PublishError};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";

pub struct SheetsBackend {
    spreadsheet_id: String,
    range: String,
    auth: ServiceAccountAuth,
    client: reqwest::Client,
    base_url: String,
}

impl SheetsBackend {
    pub fn new(config: &SheetsConfig) -> Result<Self, PublishError> {
        let auth = ServiceAccountAuth::from_keyfile(&config.keyfile, SHEETS_SCOPE)?;
        Ok(SheetsBackend {
            spreadsheet_id: config.spreadsheet_id.clone(),
            range: config.range.clone(),
            auth,
            client: http_client(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn for_tests(base_url: &str) -> Self {
        SheetsBackend {
            spreadsheet_id: "sheet-id".into(),
            range: "Sheet1".into(),
            auth: ServiceAccountAuth::fixed("test-token"),
            client: http_client(),
            base_url: base_url.to_string(),
        }
    }

    fn append_url(&self) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}:append?valueInputOption=RAW",
            self.base_url, self.spreadsheet_id, self.range
        )
    }

    fn row(measurement: &Measurement) -> Result<Vec<Value>, PublishError> {
        let mut row = Vec::with_capacity(measurement.temps_c().len() + 1);
        row.push(json!(measurement.timestamp_rfc3339()?));
        for temp in measurement.temps_c() {
            row.push(json!(temp));
        }
        Ok(row)
    }
}

#[async_trait]
impl Backend for SheetsBackend {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        let token = self.auth.access_token(&self.client).await?;
        let url = self.append_url();

        debug!("appending row to spreadsheet {}", self.spreadsheet_id);

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {token}"))
            .json(&json!({ "values": [Self::row(measurement)?] }))
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
