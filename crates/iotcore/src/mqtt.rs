//! MQTT bridge-session publish mode.
//!
//! Each publish opens a fresh TLS session against the bridge: the minted
//! token rides in the CONNECT password (the username is required but
//! ignored by the bridge), the trust roots come from the local cache, and
//! the message goes out at QoS 1 on the device's event topic. The rumqttc
//! event loop is the "background network loop"; it runs on its own task for
//! the duration of the session and is stopped on every exit path by the
//! session scope in [`crate::session`].

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, trace};

use crate::{
    device::{BridgeConfig, DeviceConfig},
    error::IotCoreError,
    roots::TrustRoots,
    session::{publish_scoped, BridgeSession},
    token::{TokenSigner, DEFAULT_TOKEN_VALIDITY},
};

/// Publishes device messages over a per-attempt MQTT bridge session.
pub struct MqttPublisher {
    device: DeviceConfig,
    signer: TokenSigner,
    bridge: BridgeConfig,
    roots: TrustRoots,
    token_validity: Duration,
}

impl MqttPublisher {
    /// Builds a publisher for `device` against the configured bridge.
    ///
    /// Fails if the device key cannot be loaded, so a bad key path is
    /// caught at construction rather than on the first publish.
    pub fn new(
        device: DeviceConfig,
        bridge: BridgeConfig,
        roots: TrustRoots,
    ) -> Result<Self, IotCoreError> {
        let signer = TokenSigner::new(&device)?;
        Ok(MqttPublisher {
            device,
            signer,
            bridge,
            roots,
            token_validity: DEFAULT_TOKEN_VALIDITY,
        })
    }

    /// Overrides the token validity window (one token per session).
    pub fn with_token_validity(mut self, validity: Duration) -> Self {
        self.token_validity = validity;
        self
    }

    /// Publishes a telemetry event through one scoped bridge session.
    pub async fn publish(&self, payload: &[u8]) -> Result<(), IotCoreError> {
        self.publish_to(&self.device.events_topic(), payload).await
    }

    /// Publishes a device state message. Not part of the default flow but
    /// supported by the bridge.
    pub async fn publish_state(&self, payload: &[u8]) -> Result<(), IotCoreError> {
        self.publish_to(&self.device.state_topic(), payload).await
    }

    async fn publish_to(&self, topic: &str, payload: &[u8]) -> Result<(), IotCoreError> {
        let ca_path = self.roots.ensure().await?;
        let ca = tokio::fs::read(&ca_path).await?;

        let token = self.signer.mint(self.token_validity)?;

        let mut opts = MqttOptions::new(
            self.device.client_id(),
            self.bridge.host.clone(),
            self.bridge.port,
        );
        opts.set_keep_alive(Duration::from_secs(self.bridge.keep_alive_secs));
        // The bridge ignores the username field and authenticates on the
        // password, which carries the token.
        opts.set_credentials("unused", token);
        opts.set_transport(Transport::Tls(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));

        let mut session =
            RumqttcSession::new(opts, Duration::from_secs(self.bridge.ack_timeout_secs));
        publish_scoped(&mut session, topic, payload).await
    }
}

/// [`BridgeSession`] backed by a rumqttc client and event loop.
pub struct RumqttcSession {
    opts: Option<MqttOptions>,
    ack_timeout: Duration,
    client: Option<AsyncClient>,
    events: Option<mpsc::Receiver<Event>>,
    loop_task: Option<JoinHandle<()>>,
}

impl RumqttcSession {
    pub fn new(opts: MqttOptions, ack_timeout: Duration) -> Self {
        RumqttcSession {
            opts: Some(opts),
            ack_timeout,
            client: None,
            events: None,
            loop_task: None,
        }
    }

    /// Consumes events until `matched` accepts one, the session ends, or
    /// the ack timeout expires. A refused CONNACK fails the wait whichever
    /// acknowledgement it was waiting for.
    async fn wait_for(
        &mut self,
        what: &'static str,
        matched: impl Fn(&Event) -> bool,
    ) -> Result<(), IotCoreError> {
        let events = self
            .events
            .as_mut()
            .ok_or(IotCoreError::SessionClosed(what))?;

        let waited = tokio::time::timeout(self.ack_timeout, async {
            while let Some(event) = events.recv().await {
                if let Event::Incoming(Packet::ConnAck(ack)) = &event {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(IotCoreError::Refused(format!("{:?}", ack.code)));
                    }
                }
                if matched(&event) {
                    return Ok(());
                }
            }
            Err(IotCoreError::SessionClosed(what))
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => Err(IotCoreError::Timeout(what)),
        }
    }
}

/// Connection lifecycle hooks. Observability only: the session outcome is
/// decided by the acknowledgement waits, never in here.
fn observe(event: &Event) {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => debug!("bridge connack: {:?}", ack.code),
        Event::Incoming(Packet::PubAck(ack)) => debug!("bridge puback: pkid {}", ack.pkid),
        Event::Incoming(Packet::Disconnect) => debug!("bridge sent disconnect"),
        other => trace!("bridge event: {other:?}"),
    }
}

#[async_trait]
impl BridgeSession for RumqttcSession {
    async fn connect(&mut self) -> Result<(), IotCoreError> {
        let opts = self
            .opts
            .take()
            .ok_or(IotCoreError::SessionClosed("connect"))?;

        let (client, mut event_loop) = AsyncClient::new(opts, 10);
        let (tx, rx) = mpsc::channel(16);

        // The background network loop. It ends when the connection drops,
        // when disconnect completes, or when the task is aborted.
        let loop_task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(event) => {
                        observe(&event);
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("network loop ended: {e}");
                        break;
                    }
                }
            }
        });

        self.client = Some(client);
        self.events = Some(rx);
        self.loop_task = Some(loop_task);

        self.wait_for("connect ack", |event| {
            matches!(event, Event::Incoming(Packet::ConnAck(_)))
        })
        .await
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), IotCoreError> {
        let client = self
            .client
            .as_ref()
            .ok_or(IotCoreError::SessionClosed("publish"))?;

        // QoS 1: at-least-once. The wait below holds the session open until
        // the broker acknowledges.
        client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await?;

        self.wait_for("publish ack", |event| {
            matches!(event, Event::Incoming(Packet::PubAck(_)))
        })
        .await
    }

    async fn teardown(&mut self) {
        if let Some(client) = self.client.take() {
            // Best effort; the outcome was already decided by the waits.
            let _ = client.disconnect().await;
        }
        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
        self.events = None;
        debug!("bridge network loop stopped");
    }
}
