//! Warden is a small lifecycle supervisor for a single local backend process. It
//! starts the service without creating duplicate instances, stops it cleanly
//! (including orphans still bound to its port), and restarts it behind a health
//! check gate.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Deployment defaults.
pub mod constants;

/// Error handling.
pub mod error;

/// Liveness probing.
pub mod health;

/// Lifecycle hooks.
pub mod hooks;

/// Service launcher.
pub mod launch;

/// Start, stop and restart orchestration.
pub mod lifecycle;

/// Process discovery.
pub mod locate;

/// Log sink helpers.
pub mod logs;

/// PID file management.
pub mod pidfile;

/// Environment checks before start.
pub mod preflight;

/// Process termination.
pub mod terminate;
