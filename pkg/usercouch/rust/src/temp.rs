// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::engine::Engine;
use crate::error::{IoContext, Result};
use crate::probe::{HealthProbe, HttpProbe};
use crate::supervisor::UserCouch;
use std::ops::{Deref, DerefMut};
use tempfile::TempDir;

const TEMPDIR_PREFIX: &str = "usercouch.";

/// A [`UserCouch`] in a fresh temporary directory. Dropping it kills the
/// engine, releases the lock and removes the directory, in that order.
pub struct TempCouch<P: HealthProbe = HttpProbe> {
    couch: UserCouch<P>,
    tmpdir: TempDir,
}

impl TempCouch<HttpProbe> {
    pub fn new(engine: Engine) -> Result<Self> {
        Self::with_probe(engine, HttpProbe::new())
    }
}

impl<P: HealthProbe> TempCouch<P> {
    pub fn with_probe(engine: Engine, probe: P) -> Result<Self> {
        let tmpdir = tempfile::Builder::new()
            .prefix(TEMPDIR_PREFIX)
            .tempdir()
            .io_context(|| "creating temporary session directory")?;
        let couch = UserCouch::with_probe(tmpdir.path(), engine, probe)?;
        Ok(Self { couch, tmpdir })
    }

    pub fn tmpdir(&self) -> &TempDir {
        &self.tmpdir
    }
}

impl<P: HealthProbe> Deref for TempCouch<P> {
    type Target = UserCouch<P>;

    fn deref(&self) -> &Self::Target {
        &self.couch
    }
}

impl<P: HealthProbe> DerefMut for TempCouch<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.couch
    }
}
