// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! A minimal certificate authority for TLS enabled sessions.
//!
//! File presence is the only state: a CA exists once its certificate file
//! does, a certificate once its signed file does. The `create`/`sign` layer
//! refuses to overwrite anything; the `ensure` layer treats an existing artifact
//! as already done.

pub mod primitives;

use crate::config::{ReplicatorOverrides, SslOverrides};
use crate::error::{Error, Result};
use log::debug;
use std::path::{Path, PathBuf};

/// A self-signed CA: `<id>.key`, `<id>.ca` and the serial counter `<id>.srl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateAuthority {
    pub id: String,
    pub key_file: PathBuf,
    pub ca_file: PathBuf,
    pub srl_file: PathBuf,
}

impl CertificateAuthority {
    pub fn new(ssldir: &Path, id: &str) -> Self {
        Self {
            id: id.to_string(),
            key_file: ssldir.join(format!("{id}.key")),
            ca_file: ssldir.join(format!("{id}.ca")),
            srl_file: ssldir.join(format!("{id}.srl")),
        }
    }

    pub fn exists(&self) -> bool {
        self.ca_file.exists()
    }

    /// Generate the key and self-signed certificate. A key left behind by an
    /// interrupted `create` is reused.
    pub fn create(&self) -> Result<()> {
        if !self.key_file.exists() {
            primitives::gen_key(&self.key_file)?;
        }
        primitives::gen_ca(&self.key_file, &self.id, &self.ca_file)
    }

    pub fn sign(&self, csr_file: &Path, cert_file: &Path) -> Result<()> {
        primitives::sign_csr(
            csr_file,
            &self.ca_file,
            &self.key_file,
            &self.srl_file,
            cert_file,
        )
    }

    pub fn issue(&self, cert: &Certificate) -> Result<()> {
        self.sign(&cert.csr_file, &cert.cert_file)
    }

    /// Create the CA unless it already exists. Returns whether anything was
    /// created.
    pub fn ensure(&self) -> Result<bool> {
        if self.exists() {
            debug!("CA {} already exists", self.id);
            return Ok(false);
        }
        self.create()?;
        Ok(true)
    }

    /// What a TLS client needs to trust servers signed by this CA.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            ca_file: self.ca_file.clone(),
            check_hostname: false,
            cert_file: None,
            key_file: None,
        }
    }
}

/// A leaf certificate: `<id>.key`, `<id>.csr` and the signed `<id>.cert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub id: String,
    pub key_file: PathBuf,
    pub csr_file: PathBuf,
    pub cert_file: PathBuf,
}

impl Certificate {
    pub fn new(ssldir: &Path, id: &str) -> Self {
        Self {
            id: id.to_string(),
            key_file: ssldir.join(format!("{id}.key")),
            csr_file: ssldir.join(format!("{id}.csr")),
            cert_file: ssldir.join(format!("{id}.cert")),
        }
    }

    pub fn exists(&self) -> bool {
        self.cert_file.exists()
    }

    /// Generate the key and signing request. Fails if either the request or
    /// the signed certificate is already on disk; a lone key is reused.
    pub fn create(&self) -> Result<()> {
        for path in [&self.csr_file, &self.cert_file] {
            if path.exists() {
                return Err(Error::FileExists { path: path.clone() });
            }
        }
        if !self.key_file.exists() {
            primitives::gen_key(&self.key_file)?;
        }
        primitives::gen_csr(&self.key_file, &self.id, &self.csr_file)
    }

    /// Have `ca` sign this certificate, creating the CA and the request
    /// first as needed. Returns whether anything was created.
    pub fn ensure(&self, ca: &CertificateAuthority) -> Result<bool> {
        if self.exists() {
            debug!("certificate {} already exists", self.id);
            return Ok(false);
        }
        ca.ensure()?;
        if !self.csr_file.exists() {
            self.create()?;
        }
        ca.issue(self)?;
        Ok(true)
    }

    /// What a TLS server needs to present this certificate.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
            ca_file: None,
        }
    }
}

/// Server side TLS material, with an optional CA for verifying clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub ca_file: Option<PathBuf>,
}

impl From<ServerConfig> for SslOverrides {
    fn from(c: ServerConfig) -> Self {
        SslOverrides {
            cert_file: Some(c.cert_file),
            key_file: Some(c.key_file),
            ca_file: c.ca_file,
        }
    }
}

/// Client side TLS material, with an optional certificate to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub ca_file: PathBuf,
    pub check_hostname: bool,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl From<ClientConfig> for ReplicatorOverrides {
    fn from(c: ClientConfig) -> Self {
        ReplicatorOverrides {
            ca_file: Some(c.ca_file),
            max_depth: None,
            cert_file: c.cert_file,
            key_file: c.key_file,
        }
    }
}

/// The CAs and certificates of one session, under its `ssl/` directory.
///
/// A server pair is a server CA plus a server certificate it signed; a
/// client pair is the same for client authentication. Either can exist alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pki {
    ssldir: PathBuf,
    server: Option<(CertificateAuthority, Certificate)>,
    client: Option<(CertificateAuthority, Certificate)>,
}

impl Pki {
    pub fn new(ssldir: &Path) -> Self {
        Self {
            ssldir: ssldir.to_path_buf(),
            server: None,
            client: None,
        }
    }

    pub fn ssldir(&self) -> &Path {
        &self.ssldir
    }

    pub fn create_server(&mut self, id: &str) -> Result<()> {
        self.server = Some(self.create_pair(id)?);
        Ok(())
    }

    pub fn create_client(&mut self, id: &str) -> Result<()> {
        self.client = Some(self.create_pair(id)?);
        Ok(())
    }

    fn create_pair(&self, id: &str) -> Result<(CertificateAuthority, Certificate)> {
        let ca = CertificateAuthority::new(&self.ssldir, &format!("{id}-ca"));
        let cert = Certificate::new(&self.ssldir, id);
        cert.ensure(&ca)?;
        Ok((ca, cert))
    }

    pub fn server_ca(&self) -> Option<&CertificateAuthority> {
        self.server.as_ref().map(|(ca, _)| ca)
    }

    pub fn server_cert(&self) -> Option<&Certificate> {
        self.server.as_ref().map(|(_, cert)| cert)
    }

    pub fn client_ca(&self) -> Option<&CertificateAuthority> {
        self.client.as_ref().map(|(ca, _)| ca)
    }

    pub fn client_cert(&self) -> Option<&Certificate> {
        self.client.as_ref().map(|(_, cert)| cert)
    }

    /// Server identity, plus the client CA when client auth is configured.
    pub fn server_config(&self) -> Option<ServerConfig> {
        let mut config = self.server_cert()?.server_config();
        config.ca_file = self.client_ca().map(|ca| ca.ca_file.clone());
        Some(config)
    }

    /// Trust in the server CA, plus the client identity when configured.
    pub fn client_config(&self) -> Option<ClientConfig> {
        let mut config = self.server_ca()?.client_config();
        if let Some(cert) = self.client_cert() {
            config.cert_file = Some(cert.cert_file.clone());
            config.key_file = Some(cert.key_file.clone());
        }
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ca_ensure_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::new(tmp.path(), "foo");
        assert_eq!(ca.key_file, tmp.path().join("foo.key"));
        assert!(!ca.exists());

        assert!(ca.ensure().unwrap());
        assert!(ca.exists());
        let pem = std::fs::read_to_string(&ca.ca_file).unwrap();
        assert!(!ca.ensure().unwrap());
        assert_eq!(std::fs::read_to_string(&ca.ca_file).unwrap(), pem);

        assert!(matches!(ca.create(), Err(Error::FileExists { .. })));
    }

    #[test]
    fn test_cert_ensure_creates_missing_ca() {
        let tmp = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::new(tmp.path(), "the-ca");
        let cert = Certificate::new(tmp.path(), "server");

        assert!(cert.ensure(&ca).unwrap());
        assert!(ca.exists());
        assert!(cert.exists());
        assert!(cert.csr_file.exists());
        assert!(!cert.ensure(&ca).unwrap());

        assert!(matches!(cert.create(), Err(Error::FileExists { .. })));
        assert!(matches!(ca.issue(&cert), Err(Error::FileExists { .. })));
    }

    #[test]
    fn test_ensure_reuses_orphaned_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::new(tmp.path(), "half-ca");
        let cert = Certificate::new(tmp.path(), "half");
        primitives::gen_key(&ca.key_file).unwrap();
        primitives::gen_key(&cert.key_file).unwrap();
        let ca_key = std::fs::read_to_string(&ca.key_file).unwrap();
        let cert_key = std::fs::read_to_string(&cert.key_file).unwrap();

        assert!(cert.ensure(&ca).unwrap());
        assert!(ca.exists());
        assert!(cert.exists());
        assert_eq!(std::fs::read_to_string(&ca.key_file).unwrap(), ca_key);
        assert_eq!(std::fs::read_to_string(&cert.key_file).unwrap(), cert_key);
    }

    #[test]
    fn test_sign_against_missing_ca_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::new(tmp.path(), "absent");
        let cert = Certificate::new(tmp.path(), "leaf");
        cert.create().unwrap();
        assert!(ca.issue(&cert).is_err());
        assert!(!cert.exists());
    }

    #[test]
    fn test_fragment_accessors() {
        let tmp = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::new(tmp.path(), "ca");
        let cert = Certificate::new(tmp.path(), "srv");

        let client = ca.client_config();
        assert_eq!(client.ca_file, ca.ca_file);
        assert!(!client.check_hostname);

        let server = cert.server_config();
        assert_eq!(server.cert_file, cert.cert_file);
        assert_eq!(server.key_file, cert.key_file);
        assert_eq!(server.ca_file, None);
    }

    #[test]
    fn test_pki_server_only() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pki = Pki::new(tmp.path());
        assert_eq!(pki.server_config(), None);
        assert_eq!(pki.client_config(), None);

        pki.create_server("localhost").unwrap();
        let server = pki.server_config().unwrap();
        assert_eq!(server.cert_file, tmp.path().join("localhost.cert"));
        assert_eq!(server.ca_file, None);

        let client = pki.client_config().unwrap();
        assert_eq!(client.ca_file, tmp.path().join("localhost-ca.ca"));
        assert_eq!(client.cert_file, None);

        let ssl: SslOverrides = server.into();
        assert_eq!(ssl.key_file, Some(tmp.path().join("localhost.key")));
    }

    #[test]
    fn test_pki_mutual() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pki = Pki::new(tmp.path());
        pki.create_server("server").unwrap();
        pki.create_client("client").unwrap();

        let server = pki.server_config().unwrap();
        assert_eq!(server.ca_file, Some(tmp.path().join("client-ca.ca")));

        let client = pki.client_config().unwrap();
        assert_eq!(client.ca_file, tmp.path().join("server-ca.ca"));
        assert_eq!(client.cert_file, Some(tmp.path().join("client.cert")));
        assert_eq!(client.key_file, Some(tmp.path().join("client.key")));

        let replicator: ReplicatorOverrides = client.into();
        assert_eq!(replicator.ca_file, Some(tmp.path().join("server-ca.ca")));
        assert_eq!(replicator.max_depth, None);

        // Re-creating an existing pair is a no-op.
        let before = std::fs::read_to_string(tmp.path().join("server.cert")).unwrap();
        pki.create_server("server").unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("server.cert")).unwrap(),
            before
        );
    }
}
