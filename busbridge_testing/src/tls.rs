//! Throwaway certificate authority and sealed stores for TLS tests.

use std::{fs, io, path::PathBuf, sync::Arc};

use busbridge::tls::{CredentialLoadError, StoreSettings, TlsSettings, seal_store, server_config};
use rcgen::{
    BasicConstraints,
    Certificate,
    CertificateParams,
    DnType,
    ExtendedKeyUsagePurpose,
    IsCa,
    KeyPair,
    KeyUsagePurpose,
};
use rustls::ServerConfig;
use tempfile::TempDir;

/// Password every fixture store is sealed with.
pub const STORE_PASSWORD: &str = "changeit";

/// Errors raised while generating fixture material.
#[derive(Debug)]
pub enum FixtureError {
    Certificate(rcgen::Error),
    Io(io::Error),
}

impl std::fmt::Display for FixtureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Certificate(e) => write!(f, "certificate generation failed: {e}"),
            Self::Io(e) => write!(f, "failed to write store: {e}"),
        }
    }
}

impl std::error::Error for FixtureError {}

impl From<rcgen::Error> for FixtureError {
    fn from(e: rcgen::Error) -> Self { Self::Certificate(e) }
}

impl From<io::Error> for FixtureError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

/// A CA plus server and client identities it signed, written as sealed PEM
/// stores into a temporary directory.
///
/// Leaf certificates are valid for `localhost` and `127.0.0.1`.
#[derive(Debug)]
pub struct TlsFixture {
    dir: TempDir,
}

impl TlsFixture {
    /// Generate fresh material.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError`] if a certificate cannot be signed or a store
    /// cannot be written.
    pub fn generate() -> Result<Self, FixtureError> {
        let ca_key = KeyPair::generate()?;
        let ca = ca_params("busbridge test CA")?.self_signed(&ca_key)?;

        let server_key = KeyPair::generate()?;
        let server = leaf_params("busbridge test broker", ExtendedKeyUsagePurpose::ServerAuth)?
            .signed_by(&server_key, &ca, &ca_key)?;
        let client_key = KeyPair::generate()?;
        let client = leaf_params("busbridge test client", ExtendedKeyUsagePurpose::ClientAuth)?
            .signed_by(&client_key, &ca, &ca_key)?;

        let dir = tempfile::tempdir()?;
        let fixture = Self { dir };
        fixture.write("trust.pem", ca.pem().as_bytes())?;
        fixture.write("server.pem", identity_pem(&server, &server_key).as_bytes())?;
        fixture.write("client.pem", identity_pem(&client, &client_key).as_bytes())?;
        fixture.write("empty.pem", b"")?;
        Ok(fixture)
    }

    fn write(&self, name: &str, pem: &[u8]) -> io::Result<()> {
        fs::write(self.path(name), seal_store(pem, STORE_PASSWORD))
    }

    /// Path of one of `trust.pem`, `server.pem`, `client.pem` or `empty.pem`.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf { self.dir.path().join(name) }

    /// Store settings for `name` unlocked with `password`.
    #[must_use]
    pub fn store(&self, name: &str, password: &str) -> StoreSettings {
        StoreSettings::new(self.path(name)).password(password)
    }

    /// Client settings trusting the CA and presenting the client identity.
    #[must_use]
    pub fn client_settings(&self) -> TlsSettings {
        TlsSettings::new(self.store("trust.pem", STORE_PASSWORD))
            .key_store(self.store("client.pem", STORE_PASSWORD))
    }

    /// Server configuration presenting the broker identity and requiring a
    /// client certificate signed by the CA.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialLoadError`] if the stores cannot be loaded.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, CredentialLoadError> {
        server_config(
            &self.store("server.pem", STORE_PASSWORD),
            Some(&self.store("trust.pem", STORE_PASSWORD)),
        )
    }
}

fn ca_params(name: &str) -> Result<CertificateParams, rcgen::Error> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    params.distinguished_name.push(DnType::CommonName, name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    Ok(params)
}

fn leaf_params(name: &str, purpose: ExtendedKeyUsagePurpose) -> Result<CertificateParams, rcgen::Error> {
    let mut params = CertificateParams::new(vec!["localhost".to_owned(), "127.0.0.1".to_owned()])?;
    params.distinguished_name.push(DnType::CommonName, name);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![purpose];
    Ok(params)
}

fn identity_pem(cert: &Certificate, key: &KeyPair) -> String {
    format!("{}{}", cert.pem(), key.serialize_pem())
}
