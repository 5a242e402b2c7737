//! Retry with exponential backoff for session acquisition.
//!
//! Only connection establishment retries here; pipeline steps never retry
//! internally. Transient step failures are reported to the external
//! submission driver, which re-invokes the whole pipeline.

use crate::error::{Error, Result};
use log::{debug, warn};
use std::thread;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the initial attempt)
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
        .min(self.max_delay_ms as f64) as u64;

        Duration::from_millis(delay_ms)
    }
}

/// Retries an operation with exponential backoff, returning the first
/// success or the last error once the budget is exhausted.
pub fn retry_with_backoff<T, F>(
    config: &RetryConfig,
    mut operation: F,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error = match operation() {
        Ok(result) => return Ok(result),
        Err(e) => {
            debug!("{} failed on initial attempt: {}", operation_name, e);
            e
        }
    };

    for attempt in 1..=config.max_retries {
        let delay = config.calculate_delay(attempt - 1);
        warn!(
            "Retrying {} (attempt {}/{}) after {:?}",
            operation_name, attempt, config.max_retries, delay
        );

        thread::sleep(delay);

        match operation() {
            Ok(result) => {
                debug!("{} succeeded on attempt {}", operation_name, attempt);
                return Ok(result);
            }
            Err(e) => {
                debug!("{} failed on attempt {}: {}", operation_name, attempt, e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Builds a human-readable diagnosis for a connection failure.
pub fn diagnose_connection_error(
    error: &Error,
    host: &str,
    port: u16,
    ssh_key: Option<&str>,
) -> String {
    let error_str = error.to_string().to_lowercase();

    let mut suggestions = Vec::new();

    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("no route to host")
    {
        suggestions.push(format!("verify the host '{}' is reachable", host));
        suggestions.push(format!("check that SSH is listening on port {}", port));
    }

    if error_str.contains("authentication") || error_str.contains("permission denied") {
        match ssh_key {
            Some(key) => {
                suggestions.push(format!("check that the SSH key exists: {}", key));
                suggestions.push(format!(
                    "verify the public key is in ~/.ssh/authorized_keys on {}",
                    host
                ));
            }
            None => {
                suggestions.push("verify your SSH agent is running (ssh-add -l)".to_string());
                suggestions.push("or configure an ssh_key for this host".to_string());
            }
        }
    }

    if suggestions.is_empty() {
        suggestions.push(format!(
            "test the connection manually: ssh -p {} {}",
            port, host
        ));
    }

    format!("{} ({})", error, suggestions.join("; "))
}
