use std::{error::Error, process::ExitCode};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use warden::{
    cli::{Cli, Commands, parse_args},
    config::{SupervisorConfig, load_config},
    error::SupervisorError,
    lifecycle::{AutoConfirm, Confirm, Lifecycle, StdinPrompt},
    logs,
};

fn main() -> ExitCode {
    let args = parse_args();
    init_logging(&args);

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            report_error(err.as_ref());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = load_config(args.config.as_deref())?;
    info!("Supervising '{}' from {:?}", config.service.name, config.project_dir);

    match args.command {
        Commands::Start { yes } => {
            if yes {
                start(config, AutoConfirm(true))?;
            } else {
                start(config, StdinPrompt)?;
            }
        }
        Commands::Stop => {
            let mut lifecycle = Lifecycle::new(config, AutoConfirm(false))?;
            let report = lifecycle.stop()?;
            let name = &lifecycle.config().service.name;
            if report.found.is_empty() {
                println!("{name} is not running");
            } else {
                for handle in &report.found {
                    println!("Killed {handle}");
                }
                println!("{name} stopped");
            }
        }
        Commands::Restart => {
            let mut lifecycle = Lifecycle::new(config, AutoConfirm(false))?;
            let report = lifecycle.restart()?;
            let name = &lifecycle.config().service.name;
            for handle in &report.stop.found {
                println!("Killed {handle}");
            }
            println!(
                "{name} restarted with PID {} (log: {})",
                report.start.launch.pid,
                report.start.launch.log_file.display()
            );
        }
        Commands::Status => {
            let lifecycle = Lifecycle::new(config, AutoConfirm(false))?;
            let report = lifecycle.status()?;
            let name = &lifecycle.config().service.name;

            if report.handles.is_empty() {
                println!("{name} is not running");
                return Ok(ExitCode::SUCCESS);
            }
            for handle in &report.handles {
                println!("{handle}");
            }
            if let Some(record) = &report.record {
                println!(
                    "Launched PID {} at {} (`{}`)",
                    record.pid,
                    record.started_at.to_rfc3339(),
                    record.command
                );
            }
            match &report.health {
                Some(Ok(status)) => println!("{} answered HTTP {status}", lifecycle.config().health_url()),
                Some(Err(reason)) => {
                    println!("{} did not answer: {reason}", lifecycle.config().health_url());
                    return Ok(ExitCode::FAILURE);
                }
                None => {}
            }
        }
        Commands::Logs { lines } => {
            let path = config.log_path();
            if !logs::show_log(&path, lines)? {
                warn!("No log output yet at {}", path.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn start<C: Confirm>(config: SupervisorConfig, confirm: C) -> Result<(), SupervisorError> {
    let mut lifecycle = Lifecycle::new(config, confirm)?;
    let report = lifecycle.start()?;
    println!(
        "{} started with PID {} (log: {})",
        lifecycle.config().service.name,
        report.launch.pid,
        report.launch.log_file.display()
    );
    Ok(())
}

fn report_error(err: &(dyn Error + 'static)) {
    error!("{err}");
    eprintln!("Error: {err}");

    if let Some(
        SupervisorError::HealthCheckFailure { log_tail, .. }
        | SupervisorError::ExitedDuringStartup { log_tail, .. },
    ) = err.downcast_ref::<SupervisorError>()
        && !log_tail.is_empty()
    {
        eprintln!("--- last {} log line(s) ---", log_tail.len());
        for line in log_tail {
            eprintln!("{line}");
        }
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.directive())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
