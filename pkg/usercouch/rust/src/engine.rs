// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};
use crate::paths::Paths;
use log::debug;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

const LEGACY_BINARY: &str = "usr/bin/couchdb";
const LEGACY_DEFAULT_INI: &str = "etc/couchdb/default.ini";
const CLUSTERED_BINARY: &str = "opt/couchdb/bin/couchdb";
const CLUSTERED_DEFAULT_INI: &str = "opt/couchdb/etc/default.ini";

/// How an installed engine is configured and launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// 1.x: ini chain given with `-n -a ...`, `[httpd]` section.
    Legacy,
    /// 2.x and later: `-couch_ini`, `[chttpd]` section and a `vm.args` file.
    Clustered,
}

impl Layout {
    /// Whether sessions also need a rendered `vm.args` file.
    pub fn needs_vm_args(self) -> bool {
        self == Layout::Clustered
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Legacy => write!(f, "legacy"),
            Layout::Clustered => write!(f, "clustered"),
        }
    }
}

/// The engine binary a supervisor launches. Built once by the caller and
/// handed to every supervisor that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    layout: Layout,
    program: PathBuf,
    default_ini: PathBuf,
    custom_args: Option<Vec<OsString>>,
}

impl Engine {
    pub fn new(layout: Layout, program: impl Into<PathBuf>, default_ini: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            program: program.into(),
            default_ini: default_ini.into(),
            custom_args: None,
        }
    }

    /// Run `program` with exactly `args`, for wrappers and test doubles.
    /// Session files are still rendered for `layout`.
    pub fn custom<I, S>(layout: Layout, program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            layout,
            program: program.into(),
            default_ini: PathBuf::new(),
            custom_args: Some(args.into_iter().map(Into::into).collect()),
        }
    }

    /// Look for an installed engine, preferring the clustered layout.
    pub fn detect() -> Result<Self> {
        Self::detect_in(Path::new("/"))
    }

    pub(crate) fn detect_in(root: &Path) -> Result<Self> {
        let candidates = [
            (Layout::Clustered, CLUSTERED_BINARY, CLUSTERED_DEFAULT_INI),
            (Layout::Legacy, LEGACY_BINARY, LEGACY_DEFAULT_INI),
        ];
        for (layout, binary, default_ini) in candidates {
            let program = root.join(binary);
            if program.is_file() {
                debug!("found {layout} engine at {}", program.display());
                return Ok(Self::new(layout, program, root.join(default_ini)));
            }
        }
        Err(Error::EngineNotFound)
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments that reset the engine's own config search path and load
    /// only the defaults plus this session's files.
    pub fn args(&self, paths: &Paths) -> Vec<OsString> {
        if let Some(ref args) = self.custom_args {
            return args.clone();
        }
        match self.layout {
            Layout::Legacy => vec![
                "-n".into(),
                "-a".into(),
                self.default_ini.clone().into(),
                "-a".into(),
                paths.ini.clone().into(),
            ],
            Layout::Clustered => vec![
                "-couch_ini".into(),
                self.default_ini.clone().into(),
                paths.ini.clone().into(),
                "-args_file".into(),
                paths.vm_args.clone().into(),
            ],
        }
    }

    pub fn command(&self, paths: &Paths) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(paths));
        cmd
    }
}
