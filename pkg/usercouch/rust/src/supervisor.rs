// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::{AuthMode, Overrides, build_config};
use crate::engine::Engine;
use crate::env::{Env, build_env};
use crate::error::{Error, IoContext, Result};
use crate::lock::DirLock;
use crate::paths::{LOCKFILE, Paths};
use crate::pki::Pki;
use crate::ports::{PORT, PortAllocator, TLS_PORT};
use crate::probe::{Health, HealthProbe, HttpProbe};
use crate::process::EngineProcess;
use crate::state::SupervisorState;
use crate::template::{render_template, render_vm_args};
use log::{debug, info, warn};
use nix::sys::signal::Signal;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

pub const DEFAULT_STARTUP_ATTEMPTS: u32 = 23;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MULTIPLIER: f64 = 1.25;

/// Identity of the server certificate issued by [`UserCouch::bootstrap_with_pki`].
pub const PKI_SERVER_ID: &str = "localhost";

/// How long `start` waits for the engine: sleep, probe, grow the delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_STARTUP_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl Backoff {
    /// Every delay the poll loop sleeps, in order. A multiplier that is not
    /// a finite non-negative number holds the delay constant, and growth
    /// saturates at [`Duration::MAX`].
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut delay = self.initial_delay;
        (0..self.attempts).map(move |_| {
            let current = delay;
            delay = self.grow(delay);
            current
        })
    }

    fn grow(&self, delay: Duration) -> Duration {
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return delay;
        }
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .unwrap_or(Duration::MAX)
    }
}

/// Owns one engine instance rooted at a session directory.
///
/// Construction takes an exclusive lock on the directory. Dropping the value
/// kills the engine and then releases the lock, on every exit path.
pub struct UserCouch<P: HealthProbe = HttpProbe> {
    engine: Engine,
    paths: Paths,
    probe: P,
    backoff: Backoff,
    state: SupervisorState,
    env: Option<Env>,
    process: Option<EngineProcess>,
    welcome: Option<Value>,
    // Declared last so it is released after the engine is gone.
    lock: DirLock,
}

impl UserCouch<HttpProbe> {
    pub fn new(basedir: &Path, engine: Engine) -> Result<Self> {
        Self::with_probe(basedir, engine, HttpProbe::new())
    }
}

impl<P: HealthProbe> UserCouch<P> {
    /// Lock `basedir` and lay out the session directories. Fails with
    /// [`Error::Lock`] if another supervisor holds the directory.
    pub fn with_probe(basedir: &Path, engine: Engine, probe: P) -> Result<Self> {
        let lock = DirLock::acquire(&basedir.join(LOCKFILE))?;
        let paths = Paths::new(basedir)?;
        info!("session at {} ({} engine)", basedir.display(), engine.layout());
        Ok(Self {
            engine,
            paths,
            probe,
            backoff: Backoff::default(),
            state: SupervisorState::Created,
            env: None,
            process: None,
            welcome: None,
            lock,
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Configure the session and start the engine. May be called once.
    ///
    /// Validation happens before anything touches the filesystem or network,
    /// so a rejected request leaves the supervisor as it was. The call only
    /// counts once the config files are written; an error before that point
    /// can be retried. Ports are reserved while the config is written and
    /// released just before the spawn; another process can grab one in that
    /// window.
    pub fn bootstrap(
        &mut self,
        mode: AuthMode,
        overrides: Overrides,
        extra: Option<&str>,
    ) -> Result<Env> {
        if self.state != SupervisorState::Created {
            return Err(Error::AlreadyBootstrapped);
        }
        let config = build_config(mode, overrides)?;

        let mut roles = vec![PORT];
        if config.ssl.is_some() {
            roles.push(TLS_PORT);
        }
        let ports = PortAllocator::bind(config.bind_address, &roles)?;
        let port_set = ports.ports()?;
        let env = build_env(mode, &config, &port_set)?;

        let layout = self.engine.layout();
        let mut ini = render_template(layout, mode, &config, &port_set, &self.paths)?;
        if let Some(extra) = extra {
            ini.push_str(extra);
        }
        write_file(&self.paths.ini, &ini)?;
        if layout.needs_vm_args() {
            write_file(&self.paths.vm_args, &render_vm_args()?)?;
        }

        ports.close();
        self.env = Some(env.clone());
        self.transition(SupervisorState::Bootstrapped);
        self.start()?;
        Ok(env)
    }

    /// Like [`bootstrap`](Self::bootstrap), but when no `ssl` overrides are
    /// given, issue a server CA and certificate under `ssl/` and enable TLS
    /// with them. The replicator is pointed at the same CA unless configured.
    pub fn bootstrap_with_pki(
        &mut self,
        mode: AuthMode,
        mut overrides: Overrides,
        extra: Option<&str>,
    ) -> Result<Env> {
        if self.state != SupervisorState::Created {
            return Err(Error::AlreadyBootstrapped);
        }
        if overrides.ssl.is_none() {
            build_config(mode, overrides.clone())?;
            let mut pki = Pki::new(&self.paths.ssl);
            pki.create_server(PKI_SERVER_ID)?;
            overrides.ssl = pki.server_config().map(Into::into);
            if overrides.replicator.is_none() {
                overrides.replicator = pki.client_config().map(Into::into);
            }
        }
        self.bootstrap(mode, overrides, extra)
    }

    /// Spawn the engine and poll until it answers. Returns `false` without
    /// doing anything if a process is already held.
    ///
    /// If the engine never answers, [`Error::StartupTimeout`] is returned and
    /// the process is left running for the caller to inspect or kill.
    pub fn start(&mut self) -> Result<bool> {
        if !self.state.is_bootstrapped() || self.env.is_none() {
            return Err(Error::NotBootstrapped);
        }
        if self.process.is_some() {
            return Ok(false);
        }
        let mut cmd = self.engine.command(&self.paths);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        self.process = Some(EngineProcess::spawn(cmd)?);
        self.transition(SupervisorState::Running);

        let backoff = self.backoff;
        for (attempt, delay) in backoff.delays().enumerate() {
            std::thread::sleep(delay);
            if self.isalive()? {
                info!("engine alive after {} probe(s)", attempt + 1);
                return Ok(true);
            }
            debug!("probe {} of {}: not alive", attempt + 1, backoff.attempts);
        }
        warn!("engine did not answer after {} probes", backoff.attempts);
        Err(Error::StartupTimeout {
            attempts: backoff.attempts,
        })
    }

    /// Terminate the engine and wait for it to exit. Returns `false` if no
    /// process is held.
    pub fn kill(&mut self) -> Result<bool> {
        let Some(mut process) = self.process.take() else {
            return Ok(false);
        };
        if process.has_exited() {
            info!("engine (pid={}) already exited", process.pid());
        } else {
            info!("terminating engine (pid={})", process.pid());
            process.send_signal(Signal::SIGTERM);
        }
        process.wait()?;
        self.welcome = None;
        self.transition(SupervisorState::Killed);
        Ok(true)
    }

    /// Restart the engine unless it is answering. Returns whether a restart
    /// happened.
    pub fn check(&mut self) -> Result<bool> {
        if self.isalive()? {
            return Ok(false);
        }
        warn!("engine not answering, restarting");
        self.kill()?;
        self.start()?;
        Ok(true)
    }

    /// Send SIGTERM without waiting and keep the handle, as if the engine
    /// died on its own.
    pub fn crash(&mut self) -> bool {
        match self.process {
            Some(ref process) => {
                warn!("crashing engine (pid={})", process.pid());
                process.send_signal(Signal::SIGTERM);
                true
            }
            None => false,
        }
    }

    /// Probe the engine once. Not answering is `Ok(false)`; an error status
    /// is [`Error::ProbeProtocol`].
    pub fn isalive(&mut self) -> Result<bool> {
        let env = self.env.as_ref().ok_or(Error::NotBootstrapped)?;
        match self.probe.probe(env)? {
            Health::Alive(welcome) => {
                self.welcome = Some(welcome);
                Ok(true)
            }
            Health::Dead => Ok(false),
        }
    }

    /// Kill the engine and release the directory.
    pub fn close(mut self) -> Result<()> {
        self.kill()?;
        Ok(())
    }

    pub fn basedir(&self) -> &Path {
        &self.paths.basedir
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn env(&self) -> Option<&Env> {
        self.env.as_ref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(EngineProcess::pid)
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// The welcome document from the last successful probe.
    pub fn welcome(&self) -> Option<&Value> {
        self.welcome.as_ref()
    }

    pub fn lockfile(&self) -> &Path {
        self.lock.path()
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    fn transition(&mut self, next: SupervisorState) {
        if !self.state.can_transition_to(next) {
            warn!("unexpected state change {} -> {next}", self.state);
        }
        debug!("state {} -> {next}", self.state);
        self.state = next;
    }
}

impl<P: HealthProbe> Drop for UserCouch<P> {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            warn!("failed to kill engine on drop: {e}");
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).io_context(|| format!("writing {}", path.display()))?;
    debug!("wrote {}", path.display());
    Ok(())
}
