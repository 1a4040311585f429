//! Configuration management for warden.
//!
//! Every component receives the resolved [`SupervisorConfig`] explicitly; nothing
//! reads ambient environment state after loading.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{constants::*, error::SupervisorError};

/// Fully resolved supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Root directory from which relative paths are resolved.
    pub project_dir: PathBuf,
    /// What is supervised and how it is launched.
    pub service: ServiceConfig,
    /// Liveness probing parameters.
    pub health: HealthConfig,
    /// Artifacts that must exist before a start.
    pub preflight: PreflightConfig,
    /// Pause between the stop and start halves of a restart.
    pub restart_pause: Duration,
    /// Shell command run after a successful restart.
    pub post_restart: Option<String>,
}

/// Service identity and launch settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Display name.
    pub name: String,
    /// TCP port the backend listens on.
    pub port: u16,
    /// Regex matched against process command lines.
    pub process_pattern: String,
    /// Entry point command, run via `sh -c`.
    pub command: String,
    /// Log sink for stdout and stderr, relative to the project directory.
    pub log_file: PathBuf,
    /// PID file, relative to the project directory.
    pub pid_file: PathBuf,
}

/// Health probe settings.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Endpoint path, e.g. `/health`.
    pub path: String,
    /// Wait before the first request.
    pub initial_delay: Duration,
    /// Polling window after the initial delay.
    pub timeout: Duration,
    /// Interval between requests.
    pub interval: Duration,
}

/// Preflight requirements, all relative to the project directory.
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// Isolated environment directory.
    pub runtime_dir: PathBuf,
    /// Interpreter inside the environment.
    pub runtime: PathBuf,
    /// Backend configuration file.
    pub config_file: PathBuf,
    /// Required source files.
    pub sources: Vec<PathBuf>,
}

impl SupervisorConfig {
    /// Builds the compiled-in deployment defaults rooted at `project_dir`.
    pub fn defaults(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            service: ServiceConfig {
                name: DEFAULT_SERVICE_NAME.to_string(),
                port: DEFAULT_PORT,
                process_pattern: DEFAULT_PROCESS_PATTERN.to_string(),
                command: DEFAULT_COMMAND.to_string(),
                log_file: PathBuf::from(DEFAULT_LOG_FILE),
                pid_file: PathBuf::from(DEFAULT_PID_FILE),
            },
            health: HealthConfig {
                path: DEFAULT_HEALTH_PATH.to_string(),
                initial_delay: HEALTH_INITIAL_DELAY,
                timeout: HEALTH_TIMEOUT,
                interval: HEALTH_POLL_INTERVAL,
            },
            preflight: PreflightConfig {
                runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
                runtime: PathBuf::from(DEFAULT_RUNTIME),
                config_file: PathBuf::from(DEFAULT_APP_CONFIG),
                sources: DEFAULT_SOURCES.iter().map(PathBuf::from).collect(),
            },
            restart_pause: RESTART_PAUSE,
            post_restart: None,
        }
    }

    /// Resolves a path against the project directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    /// Absolute path of the log sink.
    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.service.log_file)
    }

    /// Absolute path of the PID file.
    pub fn pid_path(&self) -> PathBuf {
        self.resolve(&self.service.pid_file)
    }

    /// Full health endpoint URL.
    pub fn health_url(&self) -> String {
        format!("http://localhost:{}{}", self.service.port, self.health.path)
    }

    /// Compiles the process-name selector.
    pub fn process_regex(&self) -> Result<Regex, SupervisorError> {
        Regex::new(&self.service.process_pattern).map_err(|err| {
            SupervisorError::InvalidConfig(format!(
                "process_pattern '{}' is not a valid regex: {err}",
                self.service.process_pattern
            ))
        })
    }
}

/// On-disk layout of `warden.yaml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    service: ServiceSection,
    health: HealthSection,
    preflight: PreflightSection,
    restart: RestartSection,
    hooks: Hooks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServiceSection {
    name: Option<String>,
    port: Option<u16>,
    process_pattern: Option<String>,
    command: Option<String>,
    log_file: Option<String>,
    pid_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HealthSection {
    path: Option<String>,
    initial_delay: Option<String>,
    timeout: Option<String>,
    interval: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PreflightSection {
    runtime_dir: Option<String>,
    runtime: Option<String>,
    config_file: Option<String>,
    sources: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RestartSection {
    pause: Option<String>,
}

/// Hooks that run on specific lifecycle events.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Hooks {
    post_restart: Option<String>,
}

impl ConfigFile {
    fn apply(self, config: &mut SupervisorConfig) -> Result<(), SupervisorError> {
        let service = &mut config.service;
        if let Some(name) = self.service.name {
            service.name = name;
        }
        if let Some(port) = self.service.port {
            service.port = port;
        }
        if let Some(pattern) = self.service.process_pattern {
            service.process_pattern = pattern;
        }
        if let Some(command) = self.service.command {
            service.command = command;
        }
        if let Some(log_file) = self.service.log_file {
            service.log_file = PathBuf::from(log_file);
        }
        if let Some(pid_file) = self.service.pid_file {
            service.pid_file = PathBuf::from(pid_file);
        }

        let health = &mut config.health;
        if let Some(path) = self.health.path {
            health.path = if path.starts_with('/') {
                path
            } else {
                format!("/{path}")
            };
        }
        if let Some(raw) = self.health.initial_delay {
            health.initial_delay = parse_duration(&raw)?;
        }
        if let Some(raw) = self.health.timeout {
            health.timeout = parse_duration(&raw)?;
        }
        if let Some(raw) = self.health.interval {
            health.interval = parse_duration(&raw)?;
        }

        let preflight = &mut config.preflight;
        if let Some(dir) = self.preflight.runtime_dir {
            preflight.runtime_dir = PathBuf::from(dir);
        }
        if let Some(runtime) = self.preflight.runtime {
            preflight.runtime = PathBuf::from(runtime);
        }
        if let Some(file) = self.preflight.config_file {
            preflight.config_file = PathBuf::from(file);
        }
        if let Some(sources) = self.preflight.sources {
            preflight.sources = sources.into_iter().map(PathBuf::from).collect();
        }

        if let Some(raw) = self.restart.pause {
            config.restart_pause = parse_duration(&raw)?;
        }
        if let Some(command) = self.hooks.post_restart
            && !command.trim().is_empty()
        {
            config.post_restart = Some(command);
        }

        Ok(())
    }
}

/// Expands `$VAR` and `${VAR}` references within a string.
fn expand_env_vars(input: &str) -> Result<String, SupervisorError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?")
        .map_err(|err| SupervisorError::InvalidConfig(err.to_string()))?;

    if let Some(missing) = re
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .find(|name| env::var(name).is_err())
    {
        return Err(SupervisorError::InvalidConfig(format!(
            "Missing environment variable: {missing}"
        )));
    }

    let result = re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });
    Ok(result.to_string())
}

/// Loads the supervisor configuration.
///
/// With `config_path` set the file must exist. Without it, `warden.yaml` in the
/// current directory is used when present and compiled-in defaults otherwise.
pub fn load_config(config_path: Option<&Path>) -> Result<SupervisorConfig, SupervisorError> {
    let cwd = env::current_dir().map_err(SupervisorError::ConfigRead)?;

    let path = match config_path {
        Some(path) => absolutize(&cwd, path),
        None => {
            let candidate = cwd.join(DEFAULT_CONFIG_FILE);
            if !candidate.exists() {
                let config = SupervisorConfig::defaults(cwd);
                config.process_regex()?;
                return Ok(config);
            }
            candidate
        }
    };

    let content = fs::read_to_string(&path).map_err(|e| {
        SupervisorError::ConfigRead(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, path.display()),
        ))
    })?;

    let project_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.clone());

    let mut config = SupervisorConfig::defaults(project_dir);
    let expanded = expand_env_vars(&content)?;
    if !expanded.trim().is_empty() {
        let file: ConfigFile = serde_yaml::from_str(&expanded)?;
        file.apply(&mut config)?;
    }

    config.process_regex()?;
    Ok(config)
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Parses a duration string in the format `<number>[ms|s|m|h]`; bare numbers are seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, SupervisorError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(SupervisorError::InvalidConfig(
            "Duration value cannot be empty".into(),
        ));
    }

    let invalid = || SupervisorError::InvalidConfig(format!("Invalid duration value: '{raw}'"));

    if let Some(stripped) = value.strip_suffix("ms") {
        let amount: u64 = stripped.trim().parse().map_err(|_| invalid())?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str.parse().map_err(|_| invalid())?;
    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}
