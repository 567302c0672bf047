//! Unified error type for Cloud IoT Core publishing.
//!
//! `IotCoreError` covers every failure mode of this crate: credential and
//! configuration problems caught at construction, trust-root bootstrap
//! failures, and transport errors from a single publish attempt. None of
//! these trigger retries inside the crate; retry and backoff policy belongs
//! to the caller.

use thiserror::Error;

/// The unified error type for IoT Core publish operations.
#[derive(Debug, Error)]
pub enum IotCoreError {
    /// The configured signing algorithm is not in the allow-list.
    ///
    /// Only `RS256` and `ES256` are accepted by the device bridge. This is
    /// raised at construction time, before any token is minted.
    #[error("unsupported signing algorithm: {0:?} (expected RS256 or ES256)")]
    UnsupportedAlgorithm(String),

    /// The device private key could not be read from disk.
    ///
    /// Raised at publisher construction so that a misconfigured key path
    /// fails fast rather than on the first publish.
    #[error("failed to read private key {path}")]
    KeyRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Token minting failed: the key material is incompatible with the
    /// configured algorithm, or signing itself failed.
    #[error("failed to sign device token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// The trust-root bundle could not be fetched from its well-known URL.
    #[error("trust root fetch failed: {0}")]
    TrustRootFetch(String),

    /// An HTTP request could not be sent or its response not read.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote endpoint answered a publish with a non-success status.
    #[error("publish rejected with status {status}: {body}")]
    Publish { status: u16, body: String },

    /// MQTT client rejected a command (publish/disconnect) locally.
    #[error("bridge client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// The bridge connection failed or was lost mid-session.
    ///
    /// Boxed to keep the enum small; `rumqttc::ConnectionError` is large.
    #[error("bridge connection error: {0}")]
    Connection(#[from] Box<rumqttc::ConnectionError>),

    /// The bridge refused the CONNECT (expired token, unknown device).
    #[error("bridge refused the connection: {0}")]
    Refused(String),

    /// A bounded wait (connect ack, publish ack) expired.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The bridge session ended before the expected acknowledgement.
    #[error("bridge session closed while waiting for {0}")]
    SessionClosed(&'static str),

    /// Local file I/O failed (trust-root cache, certificate material).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rumqttc::ConnectionError> for IotCoreError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        IotCoreError::Connection(Box::new(err))
    }
}
