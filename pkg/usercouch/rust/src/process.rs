// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{IoContext, Result};
use log::{info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::{Child, Command, ExitStatus, Stdio};

/// The spawned engine. Dropping it does not stop the process; the
/// supervisor decides when to terminate and reap.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
}

impl EngineProcess {
    pub fn spawn(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::null());
        let program = cmd.get_program().to_string_lossy().into_owned();
        let child = cmd
            .spawn()
            .io_context(|| format!("failed to spawn: {program}"))?;
        info!("spawned engine (pid={}, cmd={program})", child.id());
        Ok(Self { child })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn send_signal(&self, sig: Signal) {
        let pid = self.child.id();
        let Ok(raw) = i32::try_from(pid) else {
            warn!("pid {pid} out of range, not sending {sig}");
            return;
        };
        if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
            warn!("failed to send {sig} to pid {pid}: {e}");
        }
    }

    /// Block until the process exits.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let pid = self.child.id();
        let status = self
            .child
            .wait()
            .io_context(|| format!("waiting on pid {pid}"))?;
        info!("engine (pid={pid}) exited with {status}");
        Ok(status)
    }

    /// Whether the process has exited, without blocking. The exit status is
    /// reaped if it has.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}
