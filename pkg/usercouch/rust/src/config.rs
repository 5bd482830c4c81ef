// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, IoContext, Result};
use crate::secrets::{random_id, random_salt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_BIND_ADDRESS: BindAddress = BindAddress::Ipv4Loopback;
pub const DEFAULT_LOGLEVEL: &str = "notice";
pub const DEFAULT_FILE_COMPRESSION: FileCompression = FileCompression::Snappy;
pub const DEFAULT_MAX_DEPTH: u32 = 1;

/// Which credentials a session requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMode {
    /// No credentials, anyone on the bind address can do anything.
    Open,
    /// A single admin with username, password and salt.
    Basic,
    /// Basic plus an OAuth 1.0a token quadruple.
    OAuth,
}

impl AuthMode {
    pub const ALL: [AuthMode; 3] = [AuthMode::Open, AuthMode::Basic, AuthMode::OAuth];

    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::Open => "open",
            AuthMode::Basic => "basic",
            AuthMode::OAuth => "oauth",
        }
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(AuthMode::Open),
            "basic" => Ok(AuthMode::Basic),
            "oauth" => Ok(AuthMode::OAuth),
            _ => Err(Error::validation(format!("invalid auth: {s:?}"))),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four bind addresses the engine is ever started on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindAddress {
    /// `127.0.0.1`, local connections only.
    Ipv4Loopback,
    /// `0.0.0.0`, accept outside connections.
    Ipv4Any,
    /// `::1`
    Ipv6Loopback,
    /// `::`
    Ipv6Any,
}

impl BindAddress {
    pub fn as_str(self) -> &'static str {
        match self {
            BindAddress::Ipv4Loopback => "127.0.0.1",
            BindAddress::Ipv4Any => "0.0.0.0",
            BindAddress::Ipv6Loopback => "::1",
            BindAddress::Ipv6Any => "::",
        }
    }

    pub fn is_ipv6(self) -> bool {
        matches!(self, BindAddress::Ipv6Loopback | BindAddress::Ipv6Any)
    }

    /// Host part of a URL that reaches a server bound to this address.
    pub fn url_host(self) -> &'static str {
        if self.is_ipv6() { "[::1]" } else { "127.0.0.1" }
    }
}

impl FromStr for BindAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "127.0.0.1" => Ok(BindAddress::Ipv4Loopback),
            "0.0.0.0" => Ok(BindAddress::Ipv4Any),
            "::1" => Ok(BindAddress::Ipv6Loopback),
            "::" => Ok(BindAddress::Ipv6Any),
            _ => Err(Error::validation(format!("invalid bind_address: {s:?}"))),
        }
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCompression {
    None,
    Deflate(u8),
    Snappy,
}

impl FileCompression {
    pub fn all() -> Vec<FileCompression> {
        let mut all = vec![FileCompression::None];
        all.extend((1..=9).map(FileCompression::Deflate));
        all.push(FileCompression::Snappy);
        all
    }
}

impl FromStr for FileCompression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("invalid file_compression: {s:?}"));
        match s {
            "none" => Ok(FileCompression::None),
            "snappy" => Ok(FileCompression::Snappy),
            _ => {
                let level = s.strip_prefix("deflate_").ok_or_else(invalid)?;
                match level.parse::<u8>() {
                    Ok(n) if (1..=9).contains(&n) && level.len() == 1 => {
                        Ok(FileCompression::Deflate(n))
                    }
                    _ => Err(invalid()),
                }
            }
        }
    }
}

impl fmt::Display for FileCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileCompression::None => f.write_str("none"),
            FileCompression::Deflate(n) => write!(f, "deflate_{n}"),
            FileCompression::Snappy => f.write_str("snappy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthTokens {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

impl OAuthTokens {
    pub fn random() -> Self {
        Self {
            consumer_key: random_id(),
            consumer_secret: random_id(),
            token: random_id(),
            token_secret: random_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Open,
    Basic(BasicCredentials),
    OAuth {
        basic: BasicCredentials,
        oauth: OAuthTokens,
    },
}

impl Credentials {
    pub fn mode(&self) -> AuthMode {
        match self {
            Credentials::Open => AuthMode::Open,
            Credentials::Basic(_) => AuthMode::Basic,
            Credentials::OAuth { .. } => AuthMode::OAuth,
        }
    }

    pub fn basic(&self) -> Option<&BasicCredentials> {
        match self {
            Credentials::Open => None,
            Credentials::Basic(basic) | Credentials::OAuth { basic, .. } => Some(basic),
        }
    }

    pub fn oauth(&self) -> Option<&OAuthTokens> {
        match self {
            Credentials::OAuth { oauth, .. } => Some(oauth),
            _ => None,
        }
    }
}

/// Server side TLS: the engine's identity and, optionally, a CA used to
/// verify client certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub ca_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCert {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Which remote servers the replicator trusts, and optionally the client
/// certificate it presents to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatorConfig {
    pub ca_file: PathBuf,
    pub max_depth: u32,
    pub client: Option<ClientCert>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SslOverrides {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicatorOverrides {
    pub ca_file: Option<PathBuf>,
    pub max_depth: Option<i64>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

/// Caller supplied settings layered over the defaults by [`build_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Overrides {
    pub bind_address: Option<String>,
    pub loglevel: Option<String>,
    pub file_compression: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub salt: Option<String>,
    pub oauth: Option<OAuthTokens>,
    pub ssl: Option<SslOverrides>,
    pub replicator: Option<ReplicatorOverrides>,
}

impl Overrides {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::validation(format!("overrides: {e}")))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .io_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&contents)
    }
}

/// Fully resolved settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_address: BindAddress,
    pub loglevel: String,
    pub file_compression: FileCompression,
    pub credentials: Credentials,
    pub ssl: Option<SslConfig>,
    pub replicator: Option<ReplicatorConfig>,
}

impl Config {
    pub fn mode(&self) -> AuthMode {
        self.credentials.mode()
    }
}

/// Resolve `overrides` against the defaults for `mode`.
///
/// Everything is validated before anything else happens, and missing
/// secrets are filled with fresh random values. No sockets, files or
/// processes are touched.
pub fn build_config(mode: AuthMode, overrides: Overrides) -> Result<Config> {
    let bind_address = match overrides.bind_address.as_deref() {
        Some(addr) => addr.parse()?,
        None => DEFAULT_BIND_ADDRESS,
    };
    let file_compression = match overrides.file_compression.as_deref() {
        Some(fc) => fc.parse()?,
        None => DEFAULT_FILE_COMPRESSION,
    };
    let ssl = overrides.ssl.map(check_ssl_config).transpose()?;
    let replicator = overrides
        .replicator
        .map(check_replicator_config)
        .transpose()?;

    let credentials = match mode {
        AuthMode::Open => Credentials::Open,
        AuthMode::Basic => Credentials::Basic(basic_credentials(
            overrides.username,
            overrides.password,
            overrides.salt,
        )),
        AuthMode::OAuth => Credentials::OAuth {
            basic: basic_credentials(overrides.username, overrides.password, overrides.salt),
            oauth: overrides.oauth.unwrap_or_else(OAuthTokens::random),
        },
    };

    Ok(Config {
        bind_address,
        loglevel: overrides
            .loglevel
            .unwrap_or_else(|| DEFAULT_LOGLEVEL.to_string()),
        file_compression,
        credentials,
        ssl,
        replicator,
    })
}

fn basic_credentials(
    username: Option<String>,
    password: Option<String>,
    salt: Option<String>,
) -> BasicCredentials {
    BasicCredentials {
        username: username.unwrap_or_else(random_id),
        password: password.unwrap_or_else(random_id),
        salt: salt.unwrap_or_else(random_salt),
    }
}

fn required(section: &str, key: &str, value: Option<PathBuf>) -> Result<PathBuf> {
    value.ok_or_else(|| Error::validation(format!("{section}.{key} is required, but missing")))
}

fn check_file(section: &str, key: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{section}.{key} not a file: {}",
            path.display()
        )))
    }
}

fn check_ssl_config(ssl: SslOverrides) -> Result<SslConfig> {
    let cert_file = required("ssl", "cert_file", ssl.cert_file)?;
    let key_file = required("ssl", "key_file", ssl.key_file)?;
    check_file("ssl", "cert_file", &cert_file)?;
    check_file("ssl", "key_file", &key_file)?;
    if let Some(ref ca_file) = ssl.ca_file {
        check_file("ssl", "ca_file", ca_file)?;
    }
    Ok(SslConfig {
        cert_file,
        key_file,
        ca_file: ssl.ca_file,
    })
}

fn check_replicator_config(cfg: ReplicatorOverrides) -> Result<ReplicatorConfig> {
    let max_depth = match cfg.max_depth {
        None => DEFAULT_MAX_DEPTH,
        Some(d) if d < 0 => {
            return Err(Error::validation(format!("replicator.max_depth < 0: {d}")));
        }
        Some(d) => u32::try_from(d)
            .map_err(|_| Error::validation(format!("replicator.max_depth too large: {d}")))?,
    };
    let ca_file = required("replicator", "ca_file", cfg.ca_file)?;
    check_file("replicator", "ca_file", &ca_file)?;

    let client = match (cfg.cert_file, cfg.key_file) {
        (None, None) => None,
        (Some(_), None) => {
            return Err(Error::validation(
                "replicator.key_file is required, but missing",
            ));
        }
        (None, Some(_)) => {
            return Err(Error::validation(
                "replicator.cert_file is required, but missing",
            ));
        }
        (Some(cert_file), Some(key_file)) => {
            check_file("replicator", "cert_file", &cert_file)?;
            check_file("replicator", "key_file", &key_file)?;
            Some(ClientCert {
                cert_file,
                key_file,
            })
        }
    };

    Ok(ReplicatorConfig {
        ca_file,
        max_depth,
        client,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{ID_ALPHABET, ID_LEN, SALT_LEN};
    use std::fs;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "pem").unwrap();
        path
    }

    fn assert_id(value: &str) {
        assert_eq!(value.len(), ID_LEN);
        assert!(value.chars().all(|c| ID_ALPHABET.contains(c)), "{value}");
    }

    #[test]
    fn test_auth_mode_parse() {
        for mode in AuthMode::ALL {
            assert_eq!(mode.as_str().parse::<AuthMode>().unwrap(), mode);
        }
        for bad in ["", "Basic", "digest", "none"] {
            assert!(matches!(
                bad.parse::<AuthMode>(),
                Err(Error::Validation(_))
            ));
        }
    }

    #[test]
    fn test_bind_address_parse() {
        assert_eq!("::".parse::<BindAddress>().unwrap(), BindAddress::Ipv6Any);
        assert_eq!(BindAddress::Ipv6Any.url_host(), "[::1]");
        assert_eq!(BindAddress::Ipv4Any.url_host(), "127.0.0.1");
        assert!("localhost".parse::<BindAddress>().is_err());
        assert!("192.168.1.1".parse::<BindAddress>().is_err());
    }

    #[test]
    fn test_file_compression_parse() {
        for fc in FileCompression::all() {
            assert_eq!(fc.to_string().parse::<FileCompression>().unwrap(), fc);
        }
        assert_eq!(FileCompression::all().len(), 11);
        for bad in ["deflate_0", "deflate_10", "deflate_", "gzip", "deflate_05"] {
            assert!(bad.parse::<FileCompression>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_defaults_open() {
        let config = build_config(AuthMode::Open, Overrides::default()).unwrap();
        assert_eq!(config.bind_address, BindAddress::Ipv4Loopback);
        assert_eq!(config.loglevel, "notice");
        assert_eq!(config.file_compression, FileCompression::Snappy);
        assert_eq!(config.credentials, Credentials::Open);
        assert!(config.ssl.is_none());
        assert!(config.replicator.is_none());
    }

    #[test]
    fn test_basic_with_loglevel() {
        let overrides = Overrides {
            loglevel: Some("debug".into()),
            ..Default::default()
        };
        let config = build_config(AuthMode::Basic, overrides).unwrap();
        assert_eq!(config.loglevel, "debug");
        assert_eq!(config.bind_address.as_str(), "127.0.0.1");
        let basic = config.credentials.basic().unwrap();
        assert_id(&basic.username);
        assert_id(&basic.password);
        assert_eq!(basic.salt.len(), SALT_LEN);
        assert!(config.credentials.oauth().is_none());
    }

    #[test]
    fn test_random_secrets_differ() {
        let a = build_config(AuthMode::OAuth, Overrides::default()).unwrap();
        let b = build_config(AuthMode::OAuth, Overrides::default()).unwrap();
        let (ba, bb) = (a.credentials.basic().unwrap(), b.credentials.basic().unwrap());
        assert_ne!(ba.password, bb.password);
        assert_ne!(ba.salt, bb.salt);
        assert_ne!(a.credentials.oauth(), b.credentials.oauth());
    }

    #[test]
    fn test_explicit_secrets_kept() {
        let oauth = OAuthTokens::random();
        let overrides = Overrides {
            username: Some("joe".into()),
            password: Some("secret".into()),
            salt: Some("da52c844db4b8bd88ebb96d72542457a".into()),
            oauth: Some(oauth.clone()),
            ..Default::default()
        };
        let a = build_config(AuthMode::OAuth, overrides.clone()).unwrap();
        let b = build_config(AuthMode::OAuth, overrides).unwrap();
        assert_eq!(a, b);
        let basic = a.credentials.basic().unwrap();
        assert_eq!(basic.username, "joe");
        assert_eq!(basic.password, "secret");
        assert_eq!(a.credentials.oauth(), Some(&oauth));
    }

    #[test]
    fn test_partial_secrets_filled() {
        let overrides = Overrides {
            username: Some("joe".into()),
            ..Default::default()
        };
        let config = build_config(AuthMode::Basic, overrides).unwrap();
        let basic = config.credentials.basic().unwrap();
        assert_eq!(basic.username, "joe");
        assert_id(&basic.password);
    }

    #[test]
    fn test_invalid_file_compression() {
        let overrides = Overrides {
            file_compression: Some("deflate_10".into()),
            ..Default::default()
        };
        let err = build_config(AuthMode::Open, overrides).unwrap_err();
        assert!(err.to_string().contains("file_compression"), "{err}");
    }

    #[test]
    fn test_ssl_requires_cert_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let cert = touch(dir.path(), "cert.pem");
        let overrides = Overrides {
            ssl: Some(SslOverrides {
                cert_file: Some(cert),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = build_config(AuthMode::Open, overrides).unwrap_err();
        assert!(err.to_string().contains("ssl.key_file is required"), "{err}");
    }

    #[test]
    fn test_ssl_files_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let cert = touch(dir.path(), "cert.pem");
        let key = touch(dir.path(), "key.pem");
        let mut ssl = SslOverrides {
            cert_file: Some(cert.clone()),
            key_file: Some(key.clone()),
            ca_file: Some(dir.path().join("nope.pem")),
        };
        let overrides = Overrides {
            ssl: Some(ssl.clone()),
            ..Default::default()
        };
        let err = build_config(AuthMode::Open, overrides).unwrap_err();
        assert!(err.to_string().contains("ssl.ca_file not a file"), "{err}");

        ssl.ca_file = None;
        let config = build_config(
            AuthMode::Open,
            Overrides {
                ssl: Some(ssl),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            config.ssl,
            Some(SslConfig {
                cert_file: cert,
                key_file: key,
                ca_file: None
            })
        );
    }

    #[test]
    fn test_replicator_defaults_and_checks() {
        let dir = tempfile::tempdir().unwrap();
        let ca = touch(dir.path(), "ca.pem");

        let config = build_config(
            AuthMode::Open,
            Overrides {
                replicator: Some(ReplicatorOverrides {
                    ca_file: Some(ca.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .unwrap();
        let replicator = config.replicator.unwrap();
        assert_eq!(replicator.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(replicator.ca_file, ca);
        assert!(replicator.client.is_none());

        let negative = Overrides {
            replicator: Some(ReplicatorOverrides {
                ca_file: Some(ca.clone()),
                max_depth: Some(-1),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = build_config(AuthMode::Open, negative).unwrap_err();
        assert!(err.to_string().contains("max_depth < 0"), "{err}");

        let missing_ca = Overrides {
            replicator: Some(ReplicatorOverrides::default()),
            ..Default::default()
        };
        let err = build_config(AuthMode::Open, missing_ca).unwrap_err();
        assert!(err.to_string().contains("replicator.ca_file is required"));
    }

    #[test]
    fn test_replicator_client_cert() {
        let dir = tempfile::tempdir().unwrap();
        let ca = touch(dir.path(), "ca.pem");
        let cert = touch(dir.path(), "cert.pem");
        let key = touch(dir.path(), "key.pem");

        let half = Overrides {
            replicator: Some(ReplicatorOverrides {
                ca_file: Some(ca.clone()),
                cert_file: Some(cert.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = build_config(AuthMode::Open, half).unwrap_err();
        assert!(err.to_string().contains("replicator.key_file is required"));

        let full = Overrides {
            replicator: Some(ReplicatorOverrides {
                ca_file: Some(ca),
                max_depth: Some(3),
                cert_file: Some(cert.clone()),
                key_file: Some(key.clone()),
            }),
            ..Default::default()
        };
        let replicator = build_config(AuthMode::Open, full)
            .unwrap()
            .replicator
            .unwrap();
        assert_eq!(replicator.max_depth, 3);
        assert_eq!(
            replicator.client,
            Some(ClientCert {
                cert_file: cert,
                key_file: key
            })
        );
    }

    #[test]
    fn test_overrides_from_yaml() {
        let overrides = Overrides::from_yaml_str(
            "loglevel: debug\nfile_compression: deflate_6\noauth:\n  consumer_key: a\n  consumer_secret: b\n  token: c\n  token_secret: d\n",
        )
        .unwrap();
        assert_eq!(overrides.loglevel.as_deref(), Some("debug"));
        let config = build_config(AuthMode::OAuth, overrides).unwrap();
        assert_eq!(config.file_compression, FileCompression::Deflate(6));
        assert_eq!(config.credentials.oauth().unwrap().token, "c");
    }

    #[test]
    fn test_overrides_reject_unknown_keys() {
        let err = Overrides::from_yaml_str("log_level: debug\n").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_overrides_from_missing_file() {
        let err = Overrides::from_yaml_file(Path::new("/nonexistent/overrides.yaml")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
