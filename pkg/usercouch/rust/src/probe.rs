// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Readiness probing of a running engine.

use crate::env::Env;
use crate::error::{Error, Result};
use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;
use ureq::ErrorKind;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Health {
    /// The engine answered with its welcome document.
    Alive(Value),
    /// Nothing is answering yet (refused, reset, timed out).
    Dead,
}

impl Health {
    pub fn is_alive(&self) -> bool {
        matches!(self, Health::Alive(_))
    }
}

/// One readiness check against a session.
///
/// Not being reachable is `Ok(Health::Dead)`. An engine that answers with an
/// error status is up but misconfigured and must surface as
/// [`Error::ProbeProtocol`].
pub trait HealthProbe {
    fn probe(&mut self, env: &Env) -> Result<Health>;
}

/// `GET /` over plain HTTP with the session's credentials.
pub struct HttpProbe {
    agent: ureq::Agent,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { agent }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthProbe for HttpProbe {
    fn probe(&mut self, env: &Env) -> Result<Health> {
        // A connection dropped before a status line arrives is retried once.
        for attempt in 0..2 {
            let mut request = self
                .agent
                .get(&env.url)
                .set("Accept", "application/json");
            if let Some(ref auth) = env.authorization {
                request = request.set("Authorization", auth);
            }

            match request.call() {
                Ok(response) => return welcome(response),
                Err(ureq::Error::Status(status, response)) => {
                    warn!("GET {} answered {status}", env.url);
                    return Err(Error::ProbeProtocol {
                        status,
                        reason: response.status_text().to_string(),
                        method: "GET".to_string(),
                        path: "/".to_string(),
                    });
                }
                Err(ureq::Error::Transport(t)) => match t.kind() {
                    ErrorKind::ConnectionFailed | ErrorKind::Dns => {
                        debug!("GET {}: {t}", env.url);
                        return Ok(Health::Dead);
                    }
                    ErrorKind::Io | ErrorKind::BadStatus | ErrorKind::BadHeader => {
                        debug!("GET {} (attempt {}): {t}", env.url, attempt + 1);
                    }
                    _ => return Err(Error::Probe(t.to_string())),
                },
            }
        }
        Ok(Health::Dead)
    }
}

fn welcome(response: ureq::Response) -> Result<Health> {
    let body: Value = response
        .into_json()
        .map_err(|e| Error::Probe(format!("reading welcome document: {e}")))?;
    if !body.is_object() {
        return Err(Error::Probe(format!(
            "welcome document is not a JSON object: {body}"
        )));
    }
    Ok(Health::Alive(body))
}
