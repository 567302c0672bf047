//! Device identity resolution.
//!
//! The device id comes from exactly one of two places: verbatim from
//! configuration, or from the common-name attribute of the X.509
//! certificate sitting next to the device's private key. Either way the id
//! is validated here, once, and flows onward as a [`DeviceId`]. Resolution
//! is purely local; no network or service calls happen here.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::measurement::{DeviceId, ValidationError};

/// Extension of the certificate expected next to the private key
/// (`sensor-01.pem` -> `sensor-01.x509`).
const CERT_EXTENSION: &str = "x509";

/// Where the device id comes from. The configuration layer guarantees that
/// exactly one source is selected before resolution runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// Id taken verbatim from configuration.
    Explicit(String),

    /// Id read from the common name of the certificate sibling to this
    /// private key.
    Certificate { key_path: PathBuf },
}

/// Identity resolution failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The certificate expected next to the key file is not there.
    #[error("certificate file does not exist: {0}")]
    MissingCertificate(PathBuf),

    /// The certificate exists but could not be parsed, or carries no
    /// common name.
    #[error("malformed certificate {path}: {reason}")]
    MalformedCertificate { path: PathBuf, reason: String },

    /// The resolved id does not match the device-id pattern.
    #[error(transparent)]
    InvalidDeviceId(#[from] ValidationError),

    /// The certificate file exists but could not be read.
    #[error("failed to read certificate: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves the device id from the selected source.
pub fn resolve(source: &IdentitySource) -> Result<DeviceId, IdentityError> {
    match source {
        IdentitySource::Explicit(id) => Ok(DeviceId::new(id.clone())?),
        IdentitySource::Certificate { key_path } => {
            let cert_path = key_path.with_extension(CERT_EXTENSION);
            debug!("resolving device id from {}", cert_path.display());
            let cn = common_name(&cert_path)?;
            Ok(DeviceId::new(cn)?)
        }
    }
}

/// Extracts the subject common name from a PEM-encoded certificate.
fn common_name(cert_path: &Path) -> Result<String, IdentityError> {
    if !cert_path.is_file() {
        return Err(IdentityError::MissingCertificate(cert_path.to_path_buf()));
    }

    let pem_bytes = std::fs::read(cert_path)?;

    let (_, pem) = x509_parser::pem::parse_x509_pem(&pem_bytes).map_err(|e| {
        IdentityError::MalformedCertificate {
            path: cert_path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let cert = pem
        .parse_x509()
        .map_err(|e| IdentityError::MalformedCertificate {
            path: cert_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .ok_or_else(|| IdentityError::MalformedCertificate {
            path: cert_path.to_path_buf(),
            reason: "subject has no common name".to_string(),
        })?;

    Ok(cn.to_string())
}

#[cfg(test)]
mod tests {
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    use super::*;

    /// Writes `<name>.pem` (key) and `<name>.x509` (self-signed cert with
    /// the given common name) into `dir`, returning the key path.
    fn write_key_and_cert(dir: &Path, name: &str, common_name: &str) -> PathBuf {
        let key_pair = KeyPair::generate().unwrap();

        let mut params = CertificateParams::new(Vec::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;

        let cert = params.self_signed(&key_pair).unwrap();

        let key_path = dir.join(format!("{name}.pem"));
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
        std::fs::write(dir.join(format!("{name}.x509")), cert.pem()).unwrap();

        key_path
    }

    #[test]
    fn explicit_id_is_validated() {
        let id = resolve(&IdentitySource::Explicit("sensor-01".into())).unwrap();
        assert_eq!(id.as_str(), "sensor-01");

        let err = resolve(&IdentitySource::Explicit("Sensor_01".into())).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidDeviceId(_)));
    }

    #[test]
    fn certificate_common_name_becomes_the_device_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = write_key_and_cert(dir.path(), "device", "sensor-01");

        let id = resolve(&IdentitySource::Certificate { key_path }).unwrap();
        assert_eq!(id.as_str(), "sensor-01");
    }

    #[test]
    fn missing_sibling_certificate_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("device.pem");
        std::fs::write(&key_path, b"key material").unwrap();

        let err = resolve(&IdentitySource::Certificate { key_path }).unwrap_err();
        match err {
            IdentityError::MissingCertificate(path) => {
                assert_eq!(path, dir.path().join("device.x509"));
            }
            other => panic!("expected missing certificate, got {other:?}"),
        }
    }

    #[test]
    fn uppercase_common_name_fails_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = write_key_and_cert(dir.path(), "device", "Sensor_01");

        let err = resolve(&IdentitySource::Certificate { key_path }).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidDeviceId(_)));
    }

    #[test]
    fn garbage_certificate_is_malformed() {
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("device.pem");
        std::fs::write(&key_path, b"key material").unwrap();
        std::fs::write(dir.path().join("device.x509"), b"not a certificate").unwrap();

        let err = resolve(&IdentitySource::Certificate { key_path }).unwrap_err();
        assert!(matches!(err, IdentityError::MalformedCertificate { .. }));
    }
}
