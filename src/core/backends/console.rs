//! Console stream backend.
//!
//! Writes one line per measurement to stdout: either the comma-joined CSV
//! form or the human-readable record. The only failure mode is a broken
//! output stream.

use std::io::Write;

use async_trait::async_trait;

use crate::core::measurement::Measurement;

use super::{Backend, PublishError};

pub struct ConsoleBackend {
    /// Print the record form instead of the CSV line.
    record: bool,
}

impl ConsoleBackend {
    pub fn new(record: bool) -> Self {
        ConsoleBackend { record }
    }

    fn line(&self, measurement: &Measurement) -> Result<String, PublishError> {
        if self.record {
            Ok(measurement.record_string()?)
        } else {
            Ok(format!(
                "{},{}",
                measurement.timestamp_rfc3339()?,
                measurement.joined_temps()
            ))
        }
    }
}

#[async_trait]
impl Backend for ConsoleBackend {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        let line = self.line(measurement)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::core::measurement::DeviceId;

    use super::*;

    fn measurement() -> Measurement {
        Measurement::new(
            DeviceId::new("sensor-01").unwrap(),
            datetime!(2023-06-01 12:00:00 UTC),
            vec![15.0, 16.0],
        )
        .unwrap()
    }

    #[test]
    fn csv_mode_joins_timestamp_and_readings() {
        let backend = ConsoleBackend::new(false);
        assert_eq!(
            backend.line(&measurement()).unwrap(),
            "2023-06-01T12:00:00Z,15.0,16.0"
        );
    }

    #[test]
    fn record_mode_uses_the_text_encoding() {
        let backend = ConsoleBackend::new(true);
        assert_eq!(
            backend.line(&measurement()).unwrap(),
            "sensor-01 15.500°C 2023-06-01T12:00:00Z"
        );
    }

    #[tokio::test]
    async fn publish_writes_without_error() {
        let backend = ConsoleBackend::new(false);
        backend.publish(&measurement()).await.unwrap();
    }
}
