// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};
use log::debug;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on a session directory. Held for the lifetime of
/// the value and released when dropped.
pub struct DirLock {
    path: PathBuf,
    _flock: Flock<File>,
}

impl DirLock {
    /// Take the lock without blocking. Another holder, in this process or any
    /// other, makes this fail with [`Error::Lock`].
    pub fn acquire(lockfile: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lockfile)
            .map_err(|e| Error::io(format!("opening {}", lockfile.display()), e))?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => {
                debug!("locked {}", lockfile.display());
                Ok(Self {
                    path: lockfile.to_path_buf(),
                    _flock: flock,
                })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(Error::Lock {
                lockfile: lockfile.to_path_buf(),
            }),
            Err((_, errno)) => Err(Error::io(
                format!("locking {}", lockfile.display()),
                errno.into(),
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        debug!("unlocking {}", self.path.display());
    }
}
