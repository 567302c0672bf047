//! Local CSV file backend.
//!
//! Appends one row per measurement. The header row is written exactly once,
//! when the file does not exist yet or is empty; its column count is sized
//! to the first write's sample count and later appends are expected to
//! match it (the format is not reconciled if they do not).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::measurement::Measurement;

use super::{Backend, PublishError};

const DATE_COLUMN_HEADER: &str = "Date";

pub struct CsvBackend {
    path: PathBuf,
}

impl CsvBackend {
    pub fn new(path: PathBuf) -> Self {
        CsvBackend { path }
    }

    fn header(sample_count: usize) -> String {
        let mut columns = Vec::with_capacity(sample_count + 1);
        columns.push(DATE_COLUMN_HEADER.to_string());
        for i in 1..=sample_count {
            columns.push(format!("Temp{i}"));
        }
        columns.join(",")
    }
}

#[async_trait]
impl Backend for CsvBackend {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        let needs_header = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let mut out = String::new();
        if needs_header {
            out.push_str(&Self::header(measurement.temps_c().len()));
            out.push('\n');
        }
        out.push_str(&measurement.timestamp_rfc3339()?);
        out.push(',');
        out.push_str(&measurement.joined_temps());
        out.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(out.as_bytes()).await?;
        file.flush().await?;

        debug!("appended measurement to {}", self.path.display());
        Ok(())
    }
}
