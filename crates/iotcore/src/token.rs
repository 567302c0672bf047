//! Short-lived device token minting.
//!
//! The bridge authenticates devices with a signed JWT carried in the MQTT
//! password field (or an HTTP bearer header). The token is scoped to the
//! cloud project via the audience claim and bounded by its expiry; it is
//! never written to disk and never reused across sessions.

use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    device::{Algorithm, DeviceConfig},
    error::IotCoreError,
};

/// Default token lifetime. The bridge disconnects the session once the
/// token expires, so a fresh one is minted per session.
pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(60 * 60);

/// Claim set carried by a device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issue time, seconds since the Unix epoch.
    pub iat: i64,

    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,

    /// Always the cloud project id.
    pub aud: String,
}

impl Claims {
    /// Builds the claim set for a token issued at `now` and valid for
    /// `validity`.
    pub fn new(now: OffsetDateTime, validity: Duration, project_id: &str) -> Self {
        let iat = now.unix_timestamp();
        Claims {
            iat,
            exp: iat + validity.as_secs() as i64,
            aud: project_id.to_string(),
        }
    }
}

/// Signs device tokens with a private key loaded once at construction.
///
/// Construction fails if the key file cannot be read; minting fails if the
/// key material is incompatible with the configured algorithm.
pub struct TokenSigner {
    key: EncodingKey,
    algorithm: Algorithm,
    project_id: String,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &self.algorithm)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl TokenSigner {
    /// Loads the device key named by `config` and prepares it for signing.
    pub fn new(config: &DeviceConfig) -> Result<Self, IotCoreError> {
        let pem = std::fs::read(&config.private_key_path).map_err(|source| {
            IotCoreError::KeyRead {
                path: config.private_key_path.display().to_string(),
                source,
            }
        })?;

        let key = match config.algorithm {
            Algorithm::Rs256 => EncodingKey::from_rsa_pem(&pem)?,
            Algorithm::Es256 => EncodingKey::from_ec_pem(&pem)?,
        };

        Ok(TokenSigner {
            key,
            algorithm: config.algorithm,
            project_id: config.project_id.clone(),
        })
    }

    /// Mints a token issued now and valid for `validity`.
    pub fn mint(&self, validity: Duration) -> Result<String, IotCoreError> {
        let claims = Claims::new(OffsetDateTime::now_utc(), validity, &self.project_id);
        let token = encode(&Header::new(self.algorithm.jwt()), &claims, &self.key)?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, path::PathBuf};

    use time::macros::datetime;

    use super::*;

    fn device_with_key(path: PathBuf, algorithm: Algorithm) -> DeviceConfig {
        DeviceConfig {
            project_id: "my-project".into(),
            registry_id: "my-registry".into(),
            region: "us-central1".into(),
            device_id: "sensor-01".into(),
            private_key_path: path,
            algorithm,
        }
    }

    #[test]
    fn claims_expiry_is_issue_time_plus_validity() {
        let now = datetime!(2023-06-01 12:00:00 UTC);
        let claims = Claims::new(now, Duration::from_secs(60 * 60), "my-project");

        assert_eq!(claims.iat, now.unix_timestamp());
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.aud, "my-project");
    }

    #[test]
    fn missing_key_file_fails_at_construction() {
        let config = device_with_key(PathBuf::from("/no/such/key.pem"), Algorithm::Es256);

        let err = TokenSigner::new(&config).unwrap_err();
        assert!(matches!(err, IotCoreError::KeyRead { .. }));
    }

    #[test]
    fn garbage_key_material_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("sensor-01.pem");
        let mut f = std::fs::File::create(&key_path).unwrap();
        f.write_all(b"not a pem key").unwrap();

        let config = device_with_key(key_path, Algorithm::Es256);
        assert!(TokenSigner::new(&config).is_err());
    }

    #[test]
    fn mints_a_three_part_token_with_a_real_key() {
        let key_pair = rcgen::KeyPair::generate().unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("sensor-01.pem");
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        let config = device_with_key(key_path, Algorithm::Es256);
        let signer = TokenSigner::new(&config).unwrap();
        let token = signer.mint(DEFAULT_TOKEN_VALIDITY).unwrap();

        assert_eq!(token.split('.').count(), 3);
    }
}
