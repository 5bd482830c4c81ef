// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Lock held and directories in place, nothing configured.
    Created,
    /// Session config written, engine not yet spawned.
    Bootstrapped,
    /// Engine process spawned. Whether it answers is up to the probe.
    Running,
    /// Engine terminated and reaped.
    Killed,
}

impl SupervisorState {
    pub fn is_bootstrapped(self) -> bool {
        self != SupervisorState::Created
    }

    pub(crate) fn can_transition_to(self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (Created, Bootstrapped)
                | (Bootstrapped, Running)
                | (Running, Killed)
                | (Killed, Running)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Created => write!(f, "created"),
            SupervisorState::Bootstrapped => write!(f, "bootstrapped"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Killed => write!(f, "killed"),
        }
    }
}
