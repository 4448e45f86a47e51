//! Blocking JSON fetcher with bounded retries and a per-host circuit breaker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::circuit_breaker::CircuitBreaker;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle fetches disabled (offline mode)")]
    Offline,

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("provider blocked: circuit breaker open for {host}")]
    CircuitOpen { host: String },

    #[error("unexpected response format: {0}")]
    Format(String),

    #[error("no observation for {0}")]
    NoData(String),
}

/// Retry and timeout policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Sleep `base_delay × attempt` before each retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(6),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

pub struct JsonFetcher {
    client: reqwest::blocking::Client,
    policy: RetryPolicy,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl JsonFetcher {
    pub fn new(policy: RetryPolicy) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(policy.timeout)
            .user_agent("augur/0.1 (+oracle signals)")
            .build()
            .map_err(|e| OracleError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            policy,
            breakers: Mutex::new(HashMap::new()),
        })
    }

    fn breaker(&self, host: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::default_provider()))
            .clone()
    }

    /// GET `url` and decode JSON, retrying transient failures.
    pub fn get_json(&self, url: &str) -> Result<serde_json::Value, OracleError> {
        let host = host_of(url);
        let breaker = self.breaker(&host);
        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.policy.base_delay * attempt);
            }
            if !breaker.is_allowed() {
                return Err(OracleError::CircuitOpen { host });
            }

            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::FORBIDDEN {
                        breaker.trip();
                        return Err(OracleError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    if !status.is_success() {
                        breaker.record_failure();
                        last_error = Some(OracleError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                        continue;
                    }
                    let value = resp
                        .json::<serde_json::Value>()
                        .map_err(|e| OracleError::Format(format!("{url}: {e}")))?;
                    breaker.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    breaker.record_failure();
                    debug!(url, attempt, error = %e, "oracle request failed");
                    last_error = Some(OracleError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| OracleError::NoData(url.to_string())))
    }
}

fn host_of(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        assert_eq!(
            host_of("https://services.swpc.noaa.gov/json/f107_cm_flux.json"),
            "services.swpc.noaa.gov"
        );
        assert_eq!(host_of("no-scheme/path"), "no-scheme");
    }

    #[test]
    fn default_policy_is_bounded() {
        let p = RetryPolicy::default();
        assert!(p.timeout <= Duration::from_secs(6));
        assert!(p.max_retries <= 2);
        assert!(p.base_delay <= Duration::from_millis(500));
    }
}
