// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A bootstrap request was rejected before any side effect happened.
    #[error("invalid config: {0}")]
    Validation(String),

    #[error("cannot acquire exclusive lock on {}", lockfile.display())]
    Lock { lockfile: PathBuf },

    /// The engine never answered the health probe. The process is left
    /// running so the caller can inspect or kill it.
    #[error("engine did not become healthy after {attempts} probes")]
    StartupTimeout { attempts: u32 },

    /// The engine answered, but with an error status.
    #[error("{status} {reason}: {method} {path}")]
    ProbeProtocol {
        status: u16,
        reason: String,
        method: String,
        path: String,
    },

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("file already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("template references missing key {key:?}")]
    Template { key: String },

    #[error("bootstrap() has not been called")]
    NotBootstrapped,

    #[error("bootstrap() already called")]
    AlreadyBootstrapped,

    #[error("no CouchDB installation found")]
    EngineNotFound,

    #[error("serializing env: {0}")]
    Json(#[from] serde_json::Error),

    #[error("certificate error: {0}")]
    Pki(#[from] rcgen::Error),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

/// Attach a human readable context to `std::io` results.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::io(f(), e))
    }
}
