use std::time::Duration;

use reqwest::{Response, StatusCode};

/// Bounded exponential backoff applied to transport failures and 5xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` sends each request once.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff)
    }

    /// Transport failures and server errors are retried; 4xx never is.
    pub fn should_retry(&self, outcome: &Result<Response, reqwest::Error>) -> bool {
        match outcome {
            Err(_) => true,
            Ok(response) => is_retryable_status(response.status()),
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}
