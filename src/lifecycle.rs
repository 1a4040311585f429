//! Lifecycle orchestration: `start`, `stop` and `restart` composed from the
//! locator, terminator, preflight validator, launcher and health prober.
//!
//! Every command builds a fresh [`Lifecycle`] starting in [`LifecycleState::Idle`];
//! whether anything is already running is always re-derived from the OS.
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, IsTerminal, Write},
    path::PathBuf,
    thread,
};
use strum::{AsRefStr, Display};
use tracing::{debug, info, warn};

use crate::{
    config::SupervisorConfig,
    constants::{MAX_LOG_TAIL_LINES, PID_LOCK_SUFFIX, STOP_VERIFY_ATTEMPTS, STOP_VERIFY_INTERVAL},
    error::SupervisorError,
    health::{HealthOutcome, HealthProbe},
    hooks::{HOOK_TIMEOUT, HookOutcome, HookStage, run_hook},
    launch::{LaunchResult, LaunchSpec, launch},
    locate::{ProcessHandle, ServiceTarget, is_alive, locate, pids, record_is_current},
    logs::tail_lines,
    pidfile::{PidFile, PidRecord},
    preflight::{PreflightReport, requirements, validate},
    terminate::{TerminationReport, survivors, terminate},
};

/// Observable states of one lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    /// No operation has run yet, or a start was declined.
    Idle,
    /// Guard, preflight, launch and probe in progress.
    Starting,
    /// The launched process answered the health endpoint.
    Running,
    /// Signals sent; waiting for the locator to come back empty.
    Stopping,
    /// Nothing belonging to the service remains.
    Stopped,
    /// Preflight, launch or health gating failed.
    Failed,
}

/// Asks the operator whether to continue despite a conflict.
pub trait Confirm {
    /// Returns `true` to continue.
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Fixed answer, used for `--yes` and non-interactive callers.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        debug!("Auto-answering '{prompt}' with {}", self.0);
        self.0
    }
}

/// Prompts on stderr and reads one line from stdin. EOF counts as "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl Confirm for StdinPrompt {
    fn confirm(&mut self, prompt: &str) -> bool {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "{prompt} [y/N] ");
        let _ = stderr.flush();

        let stdin = io::stdin();
        if !stdin.is_terminal() {
            debug!("stdin is not a terminal; reading confirmation from pipe");
        }

        let mut answer = String::new();
        match stdin.lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        }
    }
}

/// Whether start runs the single-instance guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Standalone `start`: conflicts go through the confirmation gate.
    Guarded,
    /// Second half of `restart`: the conflict check is skipped.
    Unconditional,
}

/// Successful start.
#[derive(Debug, Clone)]
pub struct StartReport {
    /// Processes found before launching (continued past with confirmation).
    pub conflicts: Vec<ProcessHandle>,
    /// Preflight findings.
    pub preflight: PreflightReport,
    /// The spawned process.
    pub launch: LaunchResult,
    /// Healthy probe outcome.
    pub health: HealthOutcome,
}

/// Successful stop.
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    /// Processes found before signalling.
    pub found: Vec<ProcessHandle>,
    /// Signal delivery results.
    pub termination: TerminationReport,
}

/// Successful restart.
#[derive(Debug, Clone)]
pub struct RestartReport {
    /// The stop half.
    pub stop: StopReport,
    /// The start half.
    pub start: StartReport,
    /// Result of the post-restart hook, when one is configured.
    pub hook: Option<HookOutcome>,
}

/// Point-in-time view for the `status` command.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Processes belonging to the service.
    pub handles: Vec<ProcessHandle>,
    /// Contents of the PID file, if any.
    pub record: Option<PidRecord>,
    /// Single health request result; `None` when nothing is running.
    pub health: Option<Result<u16, String>>,
}

impl StatusReport {
    /// Processes exist but the endpoint does not answer.
    pub fn is_degraded(&self) -> bool {
        matches!(self.health, Some(Err(_)))
    }
}

/// Orchestrates lifecycle operations for one service.
pub struct Lifecycle<C: Confirm> {
    config: SupervisorConfig,
    target: ServiceTarget,
    pid_file: PidFile,
    probe: HealthProbe,
    confirm: C,
    state: LifecycleState,
}

impl<C: Confirm> Lifecycle<C> {
    /// Creates an orchestrator in the `Idle` state.
    pub fn new(config: SupervisorConfig, confirm: C) -> Result<Self, SupervisorError> {
        let target = ServiceTarget::from_config(&config)?;
        let pid_file = PidFile::new(config.pid_path());
        let probe = HealthProbe::from_config(&config);
        Ok(Self {
            config,
            target,
            pid_file,
            probe,
            confirm,
            state: LifecycleState::Idle,
        })
    }

    /// Replaces the health probe built from the configuration.
    pub fn with_probe(mut self, probe: HealthProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The configuration this orchestrator was built with.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Standalone start with the single-instance guard.
    pub fn start(&mut self) -> Result<StartReport, SupervisorError> {
        let _lock = self.operation_lock()?;
        self.start_inner(StartMode::Guarded)
    }

    /// Stops everything belonging to the service. Finding nothing is success.
    pub fn stop(&mut self) -> Result<StopReport, SupervisorError> {
        let _lock = self.operation_lock()?;
        self.stop_inner()
    }

    /// Unconditional stop, pause, start without the confirmation gate, then the
    /// post-restart hook.
    pub fn restart(&mut self) -> Result<RestartReport, SupervisorError> {
        let _lock = self.operation_lock()?;

        let stop = self.stop_inner()?;
        if !self.config.restart_pause.is_zero() {
            debug!("Pausing {:?} before start", self.config.restart_pause);
            thread::sleep(self.config.restart_pause);
        }
        let start = self.start_inner(StartMode::Unconditional)?;

        let hook = self.config.post_restart.as_deref().map(|command| {
            run_hook(
                HookStage::PostRestart,
                command,
                &self.config.project_dir,
                HOOK_TIMEOUT,
            )
        });

        Ok(RestartReport { stop, start, hook })
    }

    /// Locates the service and issues one health request if anything is running.
    pub fn status(&self) -> Result<StatusReport, SupervisorError> {
        let handles = locate(&self.target);
        let record = self.pid_file.load()?;
        let health = (!handles.is_empty()).then(|| self.probe.check_once());
        Ok(StatusReport {
            handles,
            record,
            health,
        })
    }

    fn start_inner(&mut self, mode: StartMode) -> Result<StartReport, SupervisorError> {
        self.transition(LifecycleState::Starting);

        let conflicts = match mode {
            StartMode::Guarded => locate(&self.target),
            StartMode::Unconditional => Vec::new(),
        };
        if !conflicts.is_empty() {
            for handle in &conflicts {
                warn!("Existing {} instance: {handle}", self.config.service.name);
            }
            let prompt = format!(
                "{} appears to be running already (PIDs {:?}). Start another instance?",
                self.config.service.name,
                pids(&conflicts)
            );
            if !self.confirm.confirm(&prompt) {
                self.transition(LifecycleState::Idle);
                return Err(SupervisorError::ConflictDetected {
                    pids: pids(&conflicts),
                });
            }
            info!("Continuing start despite existing instance");
        }

        let preflight = match validate(&requirements(&self.config)).into_result() {
            Ok(report) => report,
            Err(err) => return Err(self.fail(err)),
        };

        if let Ok(Some(record)) = self.pid_file.load()
            && !record_is_current(&record, &self.target.pattern)
        {
            debug!("Discarding stale PID file entry {}", record.pid);
            self.pid_file.remove()?;
        }

        let log_file = self.config.log_path();
        let result = launch(&LaunchSpec {
            command: &self.config.service.command,
            working_dir: &self.config.project_dir,
            log_file: &log_file,
            pid_file: &self.pid_file,
        });
        let launched = match result {
            Ok(launched) => launched,
            Err(err) => return Err(self.fail(err)),
        };

        match self.probe.probe(Some(&launched.log_file)) {
            HealthOutcome::Healthy { .. } if !is_alive(launched.pid) => {
                warn!(
                    "PID {} exited although {} answered; another process holds the port",
                    launched.pid, self.probe.url
                );
                let log_tail =
                    tail_lines(&launched.log_file, MAX_LOG_TAIL_LINES).unwrap_or_default();
                if let Err(err) = self.pid_file.remove() {
                    warn!("Failed to remove PID file for exited PID {}: {err}", launched.pid);
                }
                Err(self.fail(SupervisorError::ExitedDuringStartup {
                    pid: launched.pid,
                    url: self.probe.url.clone(),
                    log_tail,
                }))
            }
            outcome @ HealthOutcome::Healthy { .. } => {
                self.transition(LifecycleState::Running);
                info!(
                    "{} is running with PID {}",
                    self.config.service.name, launched.pid
                );
                Ok(StartReport {
                    conflicts,
                    preflight,
                    launch: launched,
                    health: outcome,
                })
            }
            HealthOutcome::Unhealthy {
                reason,
                waited,
                log_tail,
                ..
            } => {
                debug!("Last health error: {reason}");
                Err(self.fail(SupervisorError::HealthCheckFailure {
                    url: self.probe.url.clone(),
                    pid: launched.pid,
                    waited,
                    log_tail,
                }))
            }
        }
    }

    fn stop_inner(&mut self) -> Result<StopReport, SupervisorError> {
        self.transition(LifecycleState::Stopping);

        let found = locate(&self.target);
        if found.is_empty() {
            info!("No {} process found; nothing to stop", self.config.service.name);
            self.pid_file.remove()?;
            self.transition(LifecycleState::Stopped);
            return Ok(StopReport::default());
        }

        let termination = terminate(&found);
        let remaining = survivors(&self.target, STOP_VERIFY_ATTEMPTS, STOP_VERIFY_INTERVAL);
        if !remaining.is_empty() {
            for handle in &remaining {
                warn!("Still running after kill: {handle}");
            }
            return Err(SupervisorError::TerminationIncomplete {
                survivors: pids(&remaining),
            });
        }

        self.pid_file.remove()?;
        self.transition(LifecycleState::Stopped);
        info!(
            "Stopped {} ({} process(es))",
            self.config.service.name,
            found.len()
        );
        Ok(StopReport { found, termination })
    }

    fn fail(&mut self, err: SupervisorError) -> SupervisorError {
        self.transition(LifecycleState::Failed);
        err
    }

    fn transition(&mut self, next: LifecycleState) {
        debug!("Lifecycle {} -> {}", self.state, next);
        self.state = next;
    }

    /// Serializes concurrent invocations for the same service.
    fn operation_lock(&self) -> Result<File, SupervisorError> {
        let mut name = self.pid_file.path().as_os_str().to_owned();
        name.push(PID_LOCK_SUFFIX);
        let path = PathBuf::from(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.lock_exclusive()?;
        Ok(file)
    }
}
