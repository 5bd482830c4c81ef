// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Throwaway CouchDB instances for tests.
//!
//! A [`UserCouch`] locks a session directory, synthesizes a config for the
//! requested auth mode on random ports, starts the engine and hands back an
//! [`Env`] describing how to reach it.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod config;
pub mod engine;
pub mod env;
pub mod error;
mod lock;
pub mod paths;
pub mod pki;
pub mod ports;
pub mod probe;
mod process;
pub mod secrets;
pub mod state;
pub mod supervisor;
pub mod temp;
pub mod template;

pub use config::{AuthMode, BindAddress, Config, FileCompression, Overrides, build_config};
pub use engine::{Engine, Layout};
pub use env::{Env, build_env, build_url};
pub use error::{Error, Result};
pub use paths::Paths;
pub use pki::{Certificate, CertificateAuthority, Pki};
pub use ports::{PortAllocator, PortSet};
pub use probe::{Health, HealthProbe, HttpProbe};
pub use state::SupervisorState;
pub use supervisor::{Backoff, UserCouch};
pub use temp::TempCouch;
pub use template::render_template;
