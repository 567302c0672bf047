//! Bridge session lifecycle.
//!
//! A bridge session is opened per publish attempt and torn down after one
//! message: connect, publish, disconnect. The background network loop
//! started by `connect` must be stopped on every exit path, including
//! failures between connect and publish. `publish_scoped` is the single
//! place that guarantees this, independent of which transport backs the
//! session.

use async_trait::async_trait;
use tracing::warn;

use crate::error::IotCoreError;

/// One connect/publish/teardown cycle against the bridge.
///
/// `teardown` is infallible and must be safe to call after a failed
/// `connect`: implementations release whatever was acquired so far and
/// swallow shutdown-path errors (they cannot change the reported outcome).
#[async_trait]
pub trait BridgeSession {
    /// Opens the connection and starts the network loop.
    async fn connect(&mut self) -> Result<(), IotCoreError>;

    /// Publishes one payload with at-least-once delivery and waits for the
    /// broker's acknowledgement.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), IotCoreError>;

    /// Stops the network loop and releases the connection.
    async fn teardown(&mut self);
}

/// Runs one full session: connect, publish, and teardown exactly once.
///
/// The reported outcome is determined solely by connect and publish;
/// teardown always runs and never overrides it.
pub async fn publish_scoped<S>(
    session: &mut S,
    topic: &str,
    payload: &[u8],
) -> Result<(), IotCoreError>
where
    S: BridgeSession + Send,
{
    let result = match session.connect().await {
        Ok(()) => session.publish(topic, payload).await,
        Err(e) => Err(e),
    };

    session.teardown().await;

    if let Err(e) = &result {
        warn!("bridge session failed: {e}");
    }

    result
}
