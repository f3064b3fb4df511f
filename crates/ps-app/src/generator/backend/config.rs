use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::poller::{PollOptions, RetryPolicy};

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_PRICE_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub api_url: String,
    pub poll_interval: Duration,
    pub price_debounce: Duration,
    pub request_timeout: Option<Duration>,
    pub poll_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            price_debounce: Duration::from_millis(DEFAULT_PRICE_DEBOUNCE_MS),
            request_timeout: None,
            poll_retries: 0,
        }
    }
}

impl BackendConfig {
    /// Read `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self, AppError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(AppError::Config(format!(".env: {e}")));
            }
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("POSSIBLE_API_URL")
            .or_else(|| lookup("NEXT_PUBLIC_API_URL"))
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.api_url);

        let poll_interval = match parse_number(&lookup, "POSSIBLE_POLL_INTERVAL_MS")? {
            Some(0) => {
                return Err(AppError::Config(
                    "POSSIBLE_POLL_INTERVAL_MS must be greater than 0".into(),
                ));
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.poll_interval,
        };

        let price_debounce = parse_number(&lookup, "POSSIBLE_PRICE_DEBOUNCE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.price_debounce);

        let request_timeout = parse_number(&lookup, "POSSIBLE_REQUEST_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let poll_retries = parse_number(&lookup, "POSSIBLE_POLL_RETRIES")?
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(defaults.poll_retries);

        Ok(Self {
            api_url,
            poll_interval,
            price_debounce,
            request_timeout,
            poll_retries,
        })
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: self.poll_interval,
            retry: RetryPolicy::with_retries(self.poll_retries),
        }
    }
}

fn parse_number<F>(lookup: &F, key: &str) -> Result<Option<u64>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}
