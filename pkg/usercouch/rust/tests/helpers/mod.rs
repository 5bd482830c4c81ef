// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use nix::sys::signal;
use nix::unistd::Pid;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use usercouch::{Backoff, Engine, Env, Error, Health, HealthProbe, Layout, Result};

/// One scripted probe answer.
#[derive(Debug, Clone)]
pub enum Step {
    Alive,
    Dead,
    Status(u16),
}

#[derive(Debug)]
struct Script {
    queue: VecDeque<Step>,
    fallback: Step,
    calls: usize,
    last_url: Option<String>,
}

/// A probe that replays queued answers, then repeats a fallback forever.
/// Clones share the same script so a test can steer a probe it handed to a
/// supervisor.
#[derive(Debug, Clone)]
pub struct ScriptedProbe {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProbe {
    pub fn new(fallback: Step) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                queue: VecDeque::new(),
                fallback,
                calls: 0,
                last_url: None,
            })),
        }
    }

    pub fn alive() -> Self {
        Self::new(Step::Alive)
    }

    pub fn dead() -> Self {
        Self::new(Step::Dead)
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().queue.push_back(step);
    }

    pub fn set_fallback(&self, step: Step) {
        self.script.lock().unwrap().fallback = step;
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().calls
    }

    pub fn last_url(&self) -> Option<String> {
        self.script.lock().unwrap().last_url.clone()
    }
}

impl HealthProbe for ScriptedProbe {
    fn probe(&mut self, env: &Env) -> Result<Health> {
        let mut script = self.script.lock().unwrap();
        script.calls += 1;
        script.last_url = Some(env.url.clone());
        let step = match script.queue.pop_front() {
            Some(step) => step,
            None => script.fallback.clone(),
        };
        match step {
            Step::Alive => Ok(Health::Alive(
                serde_json::json!({"couchdb": "Welcome", "version": "scripted"}),
            )),
            Step::Dead => Ok(Health::Dead),
            Step::Status(status) => Err(Error::ProbeProtocol {
                status,
                reason: "Scripted".to_string(),
                method: "GET".to_string(),
                path: "/".to_string(),
            }),
        }
    }
}

/// An engine that ignores the session files and just sleeps.
pub fn sleeper(layout: Layout) -> Engine {
    Engine::custom(layout, "/bin/sleep", ["300"])
}

/// Backoff that gives up quickly.
pub fn fast_backoff(attempts: u32) -> Backoff {
    Backoff {
        attempts,
        initial_delay: Duration::from_millis(1),
        multiplier: 1.25,
    }
}

/// Check if a PID is still alive.
pub fn pid_is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Wait until a PID is no longer alive, or timeout.
pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
