//! Preflight validation of the runtime environment before a start.
use std::path::PathBuf;
use strum::{AsRefStr, Display};
use tracing::{debug, warn};

use crate::{config::SupervisorConfig, error::SupervisorError};

/// What kind of artifact a requirement describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
    /// Isolated environment directory.
    RuntimeDir,
    /// Interpreter inside the environment.
    Runtime,
    /// Backend configuration file.
    ConfigFile,
    /// Required source file.
    Source,
}

/// One required artifact, in declared check order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Absolute path that must exist.
    pub path: PathBuf,
    /// When absent, later requirements are not checked.
    pub hard: bool,
}

/// Result for a single requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// The requirement checked.
    pub requirement: Requirement,
    /// Whether it exists.
    pub present: bool,
}

/// Findings for every requirement that was checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    /// Findings in check order.
    pub findings: Vec<Finding>,
    /// Set when a hard prerequisite was missing and checking stopped early.
    pub short_circuited: bool,
}

impl PreflightReport {
    /// Passes iff every checked artifact is present and nothing was skipped.
    pub fn passed(&self) -> bool {
        !self.short_circuited && self.findings.iter().all(|finding| finding.present)
    }

    /// Paths of the missing artifacts, in check order.
    pub fn missing(&self) -> Vec<PathBuf> {
        self.findings
            .iter()
            .filter(|finding| !finding.present)
            .map(|finding| finding.requirement.path.clone())
            .collect()
    }

    /// Converts a failing report into [`SupervisorError::EnvironmentMissing`].
    pub fn into_result(self) -> Result<Self, SupervisorError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(SupervisorError::EnvironmentMissing {
                missing: self.missing(),
            })
        }
    }
}

/// The declared requirement sequence for `config`: runtime dir, runtime, config file, sources.
pub fn requirements(config: &SupervisorConfig) -> Vec<Requirement> {
    let preflight = &config.preflight;
    let mut requirements = vec![
        Requirement {
            kind: ArtifactKind::RuntimeDir,
            path: config.resolve(&preflight.runtime_dir),
            hard: true,
        },
        Requirement {
            kind: ArtifactKind::Runtime,
            path: config.resolve(&preflight.runtime),
            hard: true,
        },
        Requirement {
            kind: ArtifactKind::ConfigFile,
            path: config.resolve(&preflight.config_file),
            hard: false,
        },
    ];
    requirements.extend(preflight.sources.iter().map(|source| Requirement {
        kind: ArtifactKind::Source,
        path: config.resolve(source),
        hard: false,
    }));
    requirements
}

/// Checks each requirement in order.
///
/// A missing hard requirement stops the check; soft requirements are all
/// reported so the operator sees every absent file at once.
pub fn validate(requirements: &[Requirement]) -> PreflightReport {
    let mut report = PreflightReport::default();

    for requirement in requirements {
        let present = requirement.path.exists();
        debug!(
            "Preflight {} {:?}: {}",
            requirement.kind,
            requirement.path,
            if present { "present" } else { "missing" }
        );
        if !present {
            warn!("Missing {}: {}", requirement.kind, requirement.path.display());
        }

        report.findings.push(Finding {
            requirement: requirement.clone(),
            present,
        });

        if !present && requirement.hard {
            report.short_circuited = true;
            break;
        }
    }

    report
}
