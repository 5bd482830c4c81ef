// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Session config rendering.
//!
//! A session config is a base fragment plus optional fragments, picked from
//! which keys are present in the flat [`Params`] set, concatenated, then
//! interpolated. `{key}` is a placeholder, `{{` and `}}` are literal braces.
//! A placeholder without a matching parameter is an error, so the parameter
//! builder and the fragments cannot drift apart silently.

use crate::config::{AuthMode, Config};
use crate::engine::Layout;
use crate::error::{Error, Result};
use crate::paths::Paths;
use crate::ports::{PortSet, TLS_PORT};
use crate::secrets::{couch_hashed, random_id};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub name: &'static str,
    pub text: &'static str,
}

pub const HTTPD_LEGACY: Fragment = Fragment {
    name: "httpd",
    text: "[httpd]
bind_address = {bind_address}
port = {port}
",
};

pub const HTTPD_CLUSTERED: Fragment = Fragment {
    name: "chttpd",
    text: "[chttpd]
bind_address = {bind_address}
port = {port}

[cluster]
n = 1
q = 1

[log]
writer = file
",
};

pub const STORAGE: Fragment = Fragment {
    name: "storage",
    text: "
[couchdb]
database_dir = {databases}
view_index_dir = {views}
file_compression = {file_compression}

[log]
file = {logfile}
level = {loglevel}
",
};

pub const BASIC: Fragment = Fragment {
    name: "basic",
    text: "
[couch_httpd_auth]
require_valid_user = true

[admins]
{username} = {hashed}
",
};

pub const OAUTH: Fragment = Fragment {
    name: "oauth",
    text: "
[oauth_token_users]
{token} = {username}

[oauth_token_secrets]
{token} = {token_secret}

[oauth_consumer_secrets]
{consumer_key} = {consumer_secret}
",
};

pub const TLS_LEGACY: Fragment = Fragment {
    name: "tls",
    text: "
[daemons]
httpsd = {{couch_httpd, start_link, [https]}}

[ssl]
port = {tls_port}
cert_file = {cert_file}
key_file = {key_file}
",
};

pub const TLS_CLUSTERED: Fragment = Fragment {
    name: "tls",
    text: "
[ssl]
enable = true
port = {tls_port}
cert_file = {cert_file}
key_file = {key_file}
",
};

pub const REPLICATOR: Fragment = Fragment {
    name: "replicator",
    text: "
[replicator]
verify_ssl_certificates = true
ssl_certificate_max_depth = {replicator_max_depth}
ssl_trusted_certificates_file = {replicator_ca_file}
",
};

pub const REPLICATOR_CLIENT: Fragment = Fragment {
    name: "replicator_client",
    text: "
[replicator]
verify_ssl_certificates = true
ssl_certificate_max_depth = {replicator_max_depth}
ssl_trusted_certificates_file = {replicator_ca_file}
cert_file = {replicator_cert_file}
key_file = {replicator_key_file}
",
};

pub const VM_ARGS: Fragment = Fragment {
    name: "vm_args",
    text: "-name {node_name}
-setcookie {cookie}
-kernel error_logger silent
-sasl sasl_error_logger false
+K true
+A 16
",
};

impl Fragment {
    /// Placeholder names referenced by this fragment.
    pub fn keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        scan(self.text, |key| {
            keys.insert(key.to_string());
            Some(String::new())
        })
        .ok();
        keys
    }

    pub fn render(&self, params: &Params) -> Result<String> {
        scan(self.text, |key| params.get(key).map(str::to_string))
    }
}

/// Walk `text`, passing every placeholder to `lookup`. A `None` from the
/// lookup aborts with a missing key error.
fn scan<F>(text: &str, mut lookup: F) -> Result<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(k) => key.push(k),
                        None => return Err(Error::Template { key }),
                    }
                }
                let value = lookup(&key).ok_or_else(|| Error::Template { key: key.clone() })?;
                out.push_str(&value);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Flat key to value parameter set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// An ordered selection of fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    fragments: Vec<Fragment>,
}

impl Template {
    /// Pick the fragments for `mode` and whatever optional keys `params`
    /// carries: a TLS port adds the TLS fragment, a replicator CA adds one
    /// of the two replicator fragments depending on whether a client
    /// certificate was given.
    pub fn select(layout: Layout, mode: AuthMode, params: &Params) -> Self {
        let mut fragments = match layout {
            Layout::Legacy => vec![HTTPD_LEGACY, STORAGE],
            Layout::Clustered => vec![HTTPD_CLUSTERED, STORAGE],
        };
        match mode {
            AuthMode::Open => {}
            AuthMode::Basic => fragments.push(BASIC),
            AuthMode::OAuth => fragments.extend([BASIC, OAUTH]),
        }
        if params.contains(TLS_PORT) {
            fragments.push(match layout {
                Layout::Legacy => TLS_LEGACY,
                Layout::Clustered => TLS_CLUSTERED,
            });
        }
        if params.contains("replicator_ca_file") {
            if params.contains("replicator_cert_file") {
                fragments.push(REPLICATOR_CLIENT);
            } else {
                fragments.push(REPLICATOR);
            }
        }
        Self { fragments }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.fragments.iter().map(|f| f.name).collect()
    }

    /// Every key the selected fragments interpolate.
    pub fn keys(&self) -> BTreeSet<String> {
        self.fragments.iter().flat_map(Fragment::keys).collect()
    }

    pub fn render(&self, params: &Params) -> Result<String> {
        self.fragments.iter().map(|f| f.render(params)).collect()
    }
}

/// Flatten a resolved config into template parameters.
pub fn build_params(config: &Config, ports: &PortSet, paths: &Paths) -> Params {
    let mut params = Params::new();
    params.insert("bind_address", config.bind_address);
    params.insert("loglevel", &config.loglevel);
    params.insert("file_compression", config.file_compression);
    params.insert("databases", paths.databases.display());
    params.insert("views", paths.views.display());
    params.insert("logfile", paths.logfile.display());
    for (role, port) in ports.iter() {
        params.insert(role, port);
    }
    if let Some(ref ssl) = config.ssl {
        params.insert("cert_file", ssl.cert_file.display());
        params.insert("key_file", ssl.key_file.display());
        if let Some(ref ca_file) = ssl.ca_file {
            params.insert("ca_file", ca_file.display());
        }
    }
    if let Some(ref replicator) = config.replicator {
        params.insert("replicator_max_depth", replicator.max_depth);
        params.insert("replicator_ca_file", replicator.ca_file.display());
        if let Some(ref client) = replicator.client {
            params.insert("replicator_cert_file", client.cert_file.display());
            params.insert("replicator_key_file", client.key_file.display());
        }
    }
    if let Some(basic) = config.credentials.basic() {
        params.insert("username", &basic.username);
        params.insert("hashed", couch_hashed(&basic.password, &basic.salt));
    }
    if let Some(oauth) = config.credentials.oauth() {
        params.insert("consumer_key", &oauth.consumer_key);
        params.insert("consumer_secret", &oauth.consumer_secret);
        params.insert("token", &oauth.token);
        params.insert("token_secret", &oauth.token_secret);
    }
    params
}

/// Render the session ini for `mode`.
pub fn render_template(
    layout: Layout,
    mode: AuthMode,
    config: &Config,
    ports: &PortSet,
    paths: &Paths,
) -> Result<String> {
    if mode != config.mode() {
        return Err(Error::validation(format!(
            "auth {mode} does not match config built for {}",
            config.mode()
        )));
    }
    let params = build_params(config, ports, paths);
    Template::select(layout, mode, &params).render(&params)
}

/// Render a `vm.args` file with a fresh node name and cookie.
pub fn render_vm_args() -> Result<String> {
    let mut params = Params::new();
    params.insert(
        "node_name",
        format!("usercouch-{}@127.0.0.1", random_id().to_lowercase()),
    );
    params.insert("cookie", random_id());
    VM_ARGS.render(&params)
}
