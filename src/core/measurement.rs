//! The canonical unit of telemetry: one device, one timestamp, one or more
//! temperature readings.
//!
//! Device ids are validated exactly once, at the boundary where they are
//! determined (explicit configuration or a certificate's common name); the
//! rest of the pipeline carries the [`DeviceId`] newtype and never
//! re-validates. A [`Measurement`] is immutable after construction and is
//! consumed once by whichever backend publishes it.

use std::{fmt, sync::OnceLock};

use prost::Message;
use regex::Regex;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Lowercase start, then letters/digits/`+`/`.`/`%`/`~`/`_`/`-`, total
/// length 3 to 255. Anchored at both ends.
const DEVICE_ID_PATTERN: &str = r"^[a-z][a-z0-9+.%~_-]{2,254}$";

static DEVICE_ID_REGEX: OnceLock<Regex> = OnceLock::new();

fn device_id_regex() -> &'static Regex {
    DEVICE_ID_REGEX.get_or_init(|| Regex::new(DEVICE_ID_PATTERN).unwrap())
}

/// A device id failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid device id {input:?}: {reason}")]
pub struct ValidationError {
    pub reason: &'static str,
    pub input: String,
}

/// A validated device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validates `input` against the device-id pattern.
    pub fn new(input: impl Into<String>) -> Result<Self, ValidationError> {
        let input = input.into();
        if device_id_regex().is_match(&input) {
            Ok(DeviceId(input))
        } else {
            Err(ValidationError {
                reason: "must start with a lowercase letter, use only \
                         [a-z0-9+.%~_-], and be 3-255 characters long",
                input,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A measurement could not be built from an empty reading list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a measurement needs at least one temperature reading")]
pub struct NoReadings;

/// One telemetry reading set, immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    device_id: DeviceId,
    timestamp: OffsetDateTime,
    temps_c: Vec<f32>,
}

/// Wire form of a measurement. Backends that carry a single scalar reduce
/// the reading list before encoding; see [`Measurement::mean_temp`].
#[derive(Clone, PartialEq, Message)]
pub struct WireMeasurement {
    #[prost(string, tag = "1")]
    pub device_id: String,

    #[prost(message, optional, tag = "2")]
    pub timestamp: Option<prost_types::Timestamp>,

    #[prost(float, tag = "3")]
    pub temp: f32,
}

/// A wire payload could not be decoded back into a measurement.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed wire payload: {0}")]
    Wire(#[from] prost::DecodeError),

    #[error("wire payload has no timestamp")]
    MissingTimestamp,

    #[error("wire timestamp out of range: {0}")]
    Timestamp(#[from] time::error::ComponentRange),

    #[error(transparent)]
    DeviceId(#[from] ValidationError),
}

impl Measurement {
    /// Builds a measurement. The timestamp is captured once per logging
    /// invocation and shared by every backend in that invocation.
    pub fn new(
        device_id: DeviceId,
        timestamp: OffsetDateTime,
        temps_c: Vec<f32>,
    ) -> Result<Self, NoReadings> {
        if temps_c.is_empty() {
            return Err(NoReadings);
        }
        Ok(Measurement {
            device_id,
            timestamp,
            temps_c,
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn temps_c(&self) -> &[f32] {
        &self.temps_c
    }

    /// Reduction policy for single-scalar backends: the arithmetic mean of
    /// the sampled readings.
    pub fn mean_temp(&self) -> f32 {
        self.temps_c.iter().sum::<f32>() / self.temps_c.len() as f32
    }

    /// Stable binary encoding of this measurement with the reading list
    /// reduced to its mean.
    pub fn encode(&self) -> Vec<u8> {
        let wire = WireMeasurement {
            device_id: self.device_id.as_str().to_string(),
            timestamp: Some(prost_types::Timestamp {
                seconds: self.timestamp.unix_timestamp(),
                nanos: self.timestamp.nanosecond() as i32,
            }),
            temp: self.mean_temp(),
        };
        wire.encode_to_vec()
    }

    /// Decodes a wire payload produced by [`Measurement::encode`].
    ///
    /// `decode(encode(m)) == m` holds for any single-reading measurement
    /// with a valid device id.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let wire = WireMeasurement::decode(bytes)?;
        let ts = wire.timestamp.ok_or(DecodeError::MissingTimestamp)?;
        let timestamp =
            OffsetDateTime::from_unix_timestamp(ts.seconds)?.replace_nanosecond(ts.nanos as u32)?;
        let device_id = DeviceId::new(wire.device_id)?;

        Ok(Measurement {
            device_id,
            timestamp,
            temps_c: vec![wire.temp],
        })
    }

    /// RFC 3339 rendering of the timestamp, used by the row-oriented
    /// backends.
    pub fn timestamp_rfc3339(&self) -> Result<String, time::error::Format> {
        self.timestamp.format(&Rfc3339)
    }

    /// Comma-joined readings, e.g. `15.0,16.0`.
    pub fn joined_temps(&self) -> String {
        self.temps_c
            .iter()
            .map(|t| format!("{t:?}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// One-line human-readable record, e.g.
    /// `sensor-01 17.500°C 2023-06-01T12:00:00Z`.
    pub fn record_string(&self) -> Result<String, time::error::Format> {
        Ok(format!(
            "{} {:.3}°C {}",
            self.device_id,
            self.mean_temp(),
            self.timestamp_rfc3339()?
        ))
    }
}
