//! Root certificate authority for TLS interception.
//!
//! The root key pair is generated once and reused until deleted. Per-host leaf
//! certificates are issued and cached by hudsucker's [`RcgenAuthority`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use hudsucker::certificate_authority::RcgenAuthority;
use hudsucker::rcgen::{
    date_time_ymd, BasicConstraints, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, RsaKeySize,
    PKCS_RSA_SHA256,
};
use hudsucker::rustls::crypto::aws_lc_rs::default_provider;

pub use crate::error::CaManagerError;

const CA_CERT_FILENAME: &str = "arfa-ca.pem";
const CA_KEY_FILENAME: &str = "arfa-ca-key.pem";

const CA_COMMON_NAME: &str = "arfa-proxy-ca";
const CA_ORGANIZATION: &str = "Arfa Proxy CA";
const CA_VALIDITY_YEARS: i32 = 10;

/// Number of leaf certificates kept in memory.
const LEAF_CACHE_SIZE: u64 = 1000;

/// Manages the root CA certificate for the interception proxy.
#[derive(Debug, Clone)]
pub struct CaManager {
    ca_dir: PathBuf,
}

impl CaManager {
    /// Creates a CA manager storing its artifacts in `ca_dir`.
    pub fn new(ca_dir: impl AsRef<Path>) -> Self {
        Self {
            ca_dir: ca_dir.as_ref().to_path_buf(),
        }
    }

    /// Creates a CA manager using `~/.arfa/certs`.
    pub fn with_default_dir() -> Result<Self, CaManagerError> {
        let base_dirs = directories::BaseDirs::new()
            .ok_or_else(|| CaManagerError::Generation("Failed to get home directory".into()))?;

        Ok(Self::new(base_dirs.home_dir().join(".arfa").join("certs")))
    }

    /// Returns the CA directory.
    pub fn ca_dir(&self) -> &Path {
        &self.ca_dir
    }

    /// Returns the path to the CA certificate file.
    pub fn cert_path(&self) -> PathBuf {
        self.ca_dir.join(CA_CERT_FILENAME)
    }

    /// Returns the path to the CA private key file.
    pub fn key_path(&self) -> PathBuf {
        self.ca_dir.join(CA_KEY_FILENAME)
    }

    /// Checks if both CA artifacts exist.
    pub fn ca_exists(&self) -> bool {
        self.cert_path().exists() && self.key_path().exists()
    }

    /// Loads the CA, generating it first if either artifact is missing.
    ///
    /// Existing artifacts that fail to parse are reported as
    /// [`CaManagerError::Parse`] and left untouched.
    pub fn ensure_ca(&self) -> Result<RcgenAuthority, CaManagerError> {
        if !self.ca_exists() {
            self.generate_ca()?;
        }
        self.load_authority()
    }

    /// Generates a new RSA-4096 root CA and writes it to disk.
    pub fn generate_ca(&self) -> Result<(), CaManagerError> {
        create_private_dir(&self.ca_dir)?;

        let key_pair = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_4096)
            .map_err(|e| CaManagerError::Generation(e.to_string()))?;

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, CA_COMMON_NAME);
        dn.push(DnType::OrganizationName, CA_ORGANIZATION);
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        // Day clamped so the expiry date exists in every year.
        let today = Utc::now().date_naive();
        let (month, day) = (today.month() as u8, today.day().min(28) as u8);
        params.not_before = date_time_ymd(today.year(), month, day);
        params.not_after = date_time_ymd(today.year() + CA_VALIDITY_YEARS, month, day);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CaManagerError::Generation(e.to_string()))?;

        write_private_file(&self.cert_path(), &cert.pem())?;
        write_private_file(&self.key_path(), &key_pair.serialize_pem())?;

        tracing::info!("Generated new CA certificate at {:?}", self.cert_path());

        Ok(())
    }

    /// Loads the CA from disk into a hudsucker authority.
    pub fn load_authority(&self) -> Result<RcgenAuthority, CaManagerError> {
        let cert_pem = fs::read_to_string(self.cert_path())?;
        let key_pem = fs::read_to_string(self.key_path())?;

        let key_pair =
            KeyPair::from_pem(&key_pem).map_err(|e| CaManagerError::Parse(e.to_string()))?;

        let issuer = Issuer::from_ca_cert_pem(&cert_pem, key_pair)
            .map_err(|e| CaManagerError::Parse(e.to_string()))?;

        Ok(RcgenAuthority::new(
            issuer,
            LEAF_CACHE_SIZE,
            default_provider(),
        ))
    }

    /// Reads the CA certificate PEM for installation into a trust store.
    pub fn read_cert_pem(&self) -> Result<String, CaManagerError> {
        Ok(fs::read_to_string(self.cert_path())?)
    }
}

fn create_private_dir(dir: &Path) -> Result<(), CaManagerError> {
    fs::create_dir_all(dir).map_err(|e| CaManagerError::Write(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| CaManagerError::Write(e.to_string()))?;
    }

    Ok(())
}

fn write_private_file(path: &Path, contents: &str) -> Result<(), CaManagerError> {
    fs::write(path, contents).map_err(|e| CaManagerError::Write(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| CaManagerError::Write(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ca_manager_paths() {
        let manager = CaManager::new("/tmp/test-ca");
        assert_eq!(manager.cert_path(), PathBuf::from("/tmp/test-ca/arfa-ca.pem"));
        assert_eq!(
            manager.key_path(),
            PathBuf::from("/tmp/test-ca/arfa-ca-key.pem")
        );
    }

    #[test]
    fn ca_manager_not_exists_initially() {
        let temp_dir = TempDir::new().unwrap();
        let manager = CaManager::new(temp_dir.path().join("certs"));
        assert!(!manager.ca_exists());
    }

    #[test]
    fn ensure_ca_generates_then_reuses() {
        let temp_dir = TempDir::new().unwrap();
        let manager = CaManager::new(temp_dir.path().join("certs"));

        manager.ensure_ca().unwrap();
        assert!(manager.ca_exists());
        let first = manager.read_cert_pem().unwrap();
        assert!(first.starts_with("-----BEGIN CERTIFICATE-----"));

        manager.ensure_ca().unwrap();
        assert_eq!(manager.read_cert_pem().unwrap(), first);
    }

    #[test]
    fn ensure_ca_regenerates_when_key_missing() {
        let temp_dir = TempDir::new().unwrap();
        let manager = CaManager::new(temp_dir.path().join("certs"));

        manager.generate_ca().unwrap();
        let first = manager.read_cert_pem().unwrap();
        fs::remove_file(manager.key_path()).unwrap();

        manager.ensure_ca().unwrap();
        assert!(manager.ca_exists());
        assert_ne!(manager.read_cert_pem().unwrap(), first);
    }

    #[test]
    fn corrupt_artifacts_fail_loudly() {
        let temp_dir = TempDir::new().unwrap();
        let manager = CaManager::new(temp_dir.path());
        fs::write(manager.cert_path(), "not a certificate").unwrap();
        fs::write(manager.key_path(), "not a key").unwrap();

        let result = manager.ensure_ca();
        assert!(matches!(result, Err(CaManagerError::Parse(_))));

        // Left in place for the user to inspect.
        assert_eq!(
            fs::read_to_string(manager.cert_path()).unwrap(),
            "not a certificate"
        );
    }

    #[test]
    fn generate_fails_with_write_when_dir_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("certs");
        fs::write(&blocker, "").unwrap();

        let manager = CaManager::new(&blocker);
        let result = manager.generate_ca();
        assert!(matches!(result, Err(CaManagerError::Write(_))));
        assert!(result.unwrap_err().to_string().starts_with("Failed to write CA"));
    }

    #[test]
    fn read_cert_pem_missing() {
        let temp_dir = TempDir::new().unwrap();
        let manager = CaManager::new(temp_dir.path());
        assert!(matches!(
            manager.read_cert_pem(),
            Err(CaManagerError::Read(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn artifacts_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let manager = CaManager::new(temp_dir.path().join("certs"));
        manager.generate_ca().unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&manager.cert_path()), 0o600);
        assert_eq!(mode(&manager.key_path()), 0o600);
        assert_eq!(mode(manager.ca_dir()), 0o700);
    }
}
