// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, IoContext, Result};
use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const SESSION_INI: &str = "session.ini";
pub const VM_ARGS: &str = "vm.args";
pub const LOCKFILE: &str = "lockfile";
const LOG_NAME: &str = "couchdb";

/// Files and directories of one session, all under `basedir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub basedir: PathBuf,
    pub ini: PathBuf,
    pub vm_args: PathBuf,
    pub databases: PathBuf,
    pub views: PathBuf,
    pub dump: PathBuf,
    pub ssl: PathBuf,
    pub log: PathBuf,
    pub logfile: PathBuf,
    pub lockfile: PathBuf,
}

impl Paths {
    /// Create the session layout, reusing directories left by a previous
    /// session. A previous log file is moved aside to `couchdb.log.previous`.
    pub fn new(basedir: &Path) -> Result<Self> {
        let log = mkdir(basedir, "log")?;
        let paths = Self {
            basedir: basedir.to_path_buf(),
            ini: basedir.join(SESSION_INI),
            vm_args: basedir.join(VM_ARGS),
            databases: mkdir(basedir, "databases")?,
            views: mkdir(basedir, "views")?,
            dump: mkdir(basedir, "dump")?,
            ssl: mkdir(basedir, "ssl")?,
            logfile: rotate_logfile(&log, LOG_NAME)?,
            log,
            lockfile: basedir.join(LOCKFILE),
        };
        Ok(paths)
    }
}

/// Create `basedir/name`. An existing entry is fine only if it is a real
/// directory, not a file or a symlink.
fn mkdir(basedir: &Path, name: &str) -> Result<PathBuf> {
    let dirname = basedir.join(name);
    match fs::create_dir(&dirname) {
        Ok(()) => Ok(dirname),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let meta = fs::symlink_metadata(&dirname)
                .io_context(|| format!("inspecting {}", dirname.display()))?;
            if meta.file_type().is_dir() {
                Ok(dirname)
            } else {
                Err(Error::validation(format!(
                    "not a directory: {}",
                    dirname.display()
                )))
            }
        }
        Err(e) => Err(Error::io(format!("creating {}", dirname.display()), e)),
    }
}

fn rotate_logfile(logdir: &Path, name: &str) -> Result<PathBuf> {
    let filename = logdir.join(format!("{name}.log"));
    if filename.is_file() {
        let previous = logdir.join(format!("{name}.log.previous"));
        fs::rename(&filename, &previous)
            .io_context(|| format!("rotating {}", filename.display()))?;
        debug!("moved previous log to {}", previous.display());
    }
    Ok(filename)
}
