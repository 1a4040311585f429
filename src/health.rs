//! Liveness probing against the backend's health endpoint.
use reqwest::blocking::Client;
use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{config::SupervisorConfig, constants::MAX_LOG_TAIL_LINES, logs::tail_lines};

/// Result of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The endpoint answered with some HTTP response.
    Healthy {
        /// HTTP status received; any status counts.
        status: u16,
        /// Requests issued before the answer.
        attempts: usize,
    },
    /// No response within the window.
    Unhealthy {
        /// Last connection error observed.
        reason: String,
        /// Requests issued.
        attempts: usize,
        /// Time spent including the initial delay.
        waited: Duration,
        /// Last lines of the log sink.
        log_tail: Vec<String>,
    },
}

impl HealthOutcome {
    /// Whether the endpoint answered.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// A bounded poll of `GET <url>`.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    /// Endpoint URL.
    pub url: String,
    /// Wait before the first request.
    pub initial_delay: Duration,
    /// Polling window after the initial delay.
    pub timeout: Duration,
    /// Interval between requests.
    pub interval: Duration,
}

impl HealthProbe {
    /// Builds the probe described by the configuration.
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            url: config.health_url(),
            initial_delay: config.health.initial_delay,
            timeout: config.health.timeout,
            interval: config.health.interval,
        }
    }

    /// Waits the initial delay, then polls until a response arrives or the window closes.
    ///
    /// On failure the last lines of `log_sink` are attached to the outcome.
    pub fn probe(&self, log_sink: Option<&Path>) -> HealthOutcome {
        let started = Instant::now();
        if !self.initial_delay.is_zero() {
            debug!("Waiting {:?} before probing {}", self.initial_delay, self.url);
            thread::sleep(self.initial_delay);
        }

        let client = match build_client() {
            Ok(client) => client,
            Err(reason) => return self.unhealthy(reason, 0, started, log_sink),
        };

        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0;
        let mut last_error = String::from("no request issued");

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() && attempts > 0 {
                break;
            }
            attempts += 1;

            match request(&client, &self.url, remaining.max(Duration::from_millis(1))) {
                Ok(status) => {
                    info!("Health check passed for {} on attempt {attempts} (HTTP {status})", self.url);
                    return HealthOutcome::Healthy { status, attempts };
                }
                Err(err) => {
                    debug!("Health check attempt {attempts} against {} failed: {err}", self.url);
                    last_error = err;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(self.interval.min(remaining));
        }

        warn!("Health check against {} failed after {attempts} attempt(s)", self.url);
        self.unhealthy(last_error, attempts, started, log_sink)
    }

    /// Issues a single request with no initial delay.
    pub fn check_once(&self) -> Result<u16, String> {
        let client = build_client()?;
        request(&client, &self.url, self.timeout)
    }

    fn unhealthy(
        &self,
        reason: String,
        attempts: usize,
        started: Instant,
        log_sink: Option<&Path>,
    ) -> HealthOutcome {
        let log_tail = log_sink
            .map(|path| match tail_lines(path, MAX_LOG_TAIL_LINES) {
                Ok(lines) => lines,
                Err(err) => {
                    debug!("Unable to read log sink {:?}: {err}", path);
                    Vec::new()
                }
            })
            .unwrap_or_default();

        HealthOutcome::Unhealthy {
            reason,
            attempts,
            waited: started.elapsed(),
            log_tail,
        }
    }
}

fn build_client() -> Result<Client, String> {
    Client::builder()
        .no_proxy()
        .build()
        .map_err(|err| err.to_string())
}

fn request(client: &Client, url: &str, timeout: Duration) -> Result<u16, String> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .map_err(|err| err.to_string())?;
    Ok(response.status().as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs,
        io::{Read, Write},
        net::TcpListener,
    };
    use tempfile::tempdir;

    fn serve_once(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        port
    }

    fn probe_for(port: u16, timeout: Duration) -> HealthProbe {
        HealthProbe {
            url: format!("http://127.0.0.1:{port}/health"),
            initial_delay: Duration::ZERO,
            timeout,
            interval: Duration::from_millis(50),
        }
    }

    fn closed_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn any_http_response_is_healthy() {
        let port = serve_once("503 Service Unavailable");
        let outcome = probe_for(port, Duration::from_secs(2)).probe(None);
        assert_eq!(outcome, HealthOutcome::Healthy { status: 503, attempts: 1 });
    }

    #[test]
    fn connection_refused_is_unhealthy_with_log_tail() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("app.log");
        fs::write(&log, "booting\nTraceback: boom\n").unwrap();

        let outcome = probe_for(closed_port(), Duration::from_millis(300)).probe(Some(&log));
        match outcome {
            HealthOutcome::Unhealthy {
                attempts, log_tail, ..
            } => {
                assert!(attempts >= 1);
                assert_eq!(log_tail, vec!["booting", "Traceback: boom"]);
            }
            other => panic!("expected unhealthy, got {other:?}"),
        }
    }

    #[test]
    fn initial_delay_is_honoured() {
        let mut probe = probe_for(closed_port(), Duration::from_millis(100));
        probe.initial_delay = Duration::from_millis(300);

        let started = Instant::now();
        let outcome = probe.probe(None);
        assert!(!outcome.is_healthy());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn check_once_reports_status() {
        let port = serve_once("200 OK");
        assert_eq!(probe_for(port, Duration::from_secs(2)).check_once(), Ok(200));
        assert!(probe_for(closed_port(), Duration::from_millis(200)).check_once().is_err());
    }
}
