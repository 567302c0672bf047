//! Cloud IoT Core backends.
//!
//! Thin adapters between the backend contract and the two transport modes
//! in the `iotcore` crate. The measurement is encoded here; the transport
//! crate deals in opaque payload bytes. The device id arrives already
//! resolved and validated.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    config::backend::{IotCoreHttpConfig, IotCoreMqttConfig},
    core::measurement::{DeviceId, Measurement},
};

use super::{Backend, PublishError};

/// HTTP transport: one authenticated POST per publish.
#[derive(Debug)]
pub struct IotCoreHttpBackend {
    publisher: ::iotcore::HttpPublisher,
}

impl IotCoreHttpBackend {
    pub fn new(config: &IotCoreHttpConfig, device_id: &DeviceId) -> Result<Self, PublishError> {
        let publisher = ::iotcore::HttpPublisher::new(config.core.device(device_id))?
            .with_base_url(config.publish_base_url.clone())
            .with_token_validity(Duration::from_secs(config.core.token_validity_minutes * 60))
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs));
        Ok(IotCoreHttpBackend { publisher })
    }
}

#[async_trait]
impl Backend for IotCoreHttpBackend {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        self.publisher.publish(&measurement.encode()).await?;
        Ok(())
    }
}

/// MQTT transport: one scoped bridge session per publish.
pub struct IotCoreMqttBackend {
    publisher: ::iotcore::MqttPublisher,
}

impl IotCoreMqttBackend {
    pub fn new(config: &IotCoreMqttConfig, device_id: &DeviceId) -> Result<Self, PublishError> {
        let publisher = ::iotcore::MqttPublisher::new(
            config.core.device(device_id),
            config.bridge(),
            config.roots(),
        )?
        .with_token_validity(Duration::from_secs(config.core.token_validity_minutes * 60));
        Ok(IotCoreMqttBackend { publisher })
    }
}

#[async_trait]
impl Backend for IotCoreMqttBackend {
    async fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        self.publisher.publish(&measurement.encode()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::config::backend::IotCoreConfig;

    use super::*;

    fn device_id() -> DeviceId {
        DeviceId::new("sensor-01").unwrap()
    }

    fn core_config(key_path: PathBuf) -> IotCoreConfig {
        IotCoreConfig {
            project_id: "my-project".into(),
            registry_id: "my-registry".into(),
            cloud_region: "us-central1".into(),
            private_key_path: key_path,
            algorithm: ::iotcore::Algorithm::Es256,
            device_id: Some("sensor-01".into()),
            device_id_from_cert: false,
            token_validity_minutes: 60,
        }
    }

    #[test]
    fn missing_key_file_fails_backend_construction() {
        let config = IotCoreHttpConfig {
            core: core_config(PathBuf::from("/no/such/key.pem")),
            publish_base_url: "http://localhost".into(),
            request_timeout_secs: 5,
        };

        let err = IotCoreHttpBackend::new(&config, &device_id()).unwrap_err();
        assert!(matches!(err, PublishError::IotCore(_)));
    }

    #[test]
    fn http_backend_builds_with_a_valid_key() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("sensor-01.pem");
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        let config = IotCoreHttpConfig {
            core: core_config(key_path),
            publish_base_url: "http://localhost".into(),
            request_timeout_secs: 5,
        };

        assert!(IotCoreHttpBackend::new(&config, &device_id()).is_ok());
    }
}
