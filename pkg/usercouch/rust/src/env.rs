// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::{AuthMode, BindAddress, Config, OAuthTokens};
use crate::error::{Error, Result};
use crate::ports::{PORT, PortSet, TLS_PORT};
use crate::secrets::basic_auth_header;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// What test code needs to talk to a session: where it listens and how to
/// authenticate. The salt never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    pub port: u16,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthTokens>,
    /// Same session reached over TLS.
    #[serde(rename = "x_env_ssl", default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<Box<Env>>,
}

impl Env {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `http://127.0.0.1:5984/`, `https://[::1]:6984/` and so on.
pub fn build_url(scheme: &str, bind_address: BindAddress, port: u16) -> Result<String> {
    if scheme != "http" && scheme != "https" {
        return Err(Error::validation(format!(
            "scheme must be 'http' or 'https'; got {scheme:?}"
        )));
    }
    Ok(format!("{scheme}://{}:{port}/", bind_address.url_host()))
}

pub fn build_env(mode: AuthMode, config: &Config, ports: &PortSet) -> Result<Env> {
    if mode != config.mode() {
        return Err(Error::validation(format!(
            "auth {mode} does not match config built for {}",
            config.mode()
        )));
    }
    let port = ports
        .get(PORT)
        .ok_or_else(|| Error::validation(format!("no {PORT:?} allocated")))?;

    let mut env = Env {
        port,
        url: build_url("http", config.bind_address, port)?,
        basic: None,
        authorization: None,
        oauth: config.credentials.oauth().cloned(),
        ssl: None,
    };
    if let Some(basic) = config.credentials.basic() {
        env.authorization = Some(basic_auth_header(&basic.username, &basic.password));
        env.basic = Some(BasicAuth {
            username: basic.username.clone(),
            password: basic.password.clone(),
        });
    }
    if let Some(tls_port) = ports.get(TLS_PORT) {
        let mut secure = env.clone();
        secure.port = tls_port;
        secure.url = build_url("https", config.bind_address, tls_port)?;
        env.ssl = Some(Box::new(secure));
    }
    Ok(env)
}
