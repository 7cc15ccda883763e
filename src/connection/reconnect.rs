//! Reconnection policy: exponential backoff with jitter, plus the
//! close-frame disposition rules.
//!
//! A close with the normal-closure code and the server's "Session waiting"
//! reason means the participant is intentionally parked until enough
//! traders join; reconnecting would only churn the server, so that close
//! is held rather than retried.

use serde::{Deserialize, Serialize};

use super::ConnectionError;
use crate::error::AppError;

/// Normal-closure WebSocket code used by the server for intentional holds
pub const CLOSE_NORMAL: u16 = 1000;

/// Close reason marking an intentional server-side hold
pub const REASON_SESSION_WAITING: &str = "Session waiting";

/// Configuration for reconnection attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts
    pub max_attempts: u32,
    /// Initial delay in milliseconds (doubles each attempt)
    pub initial_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 3000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_attempts == 0 {
            return Err(AppError::Config(
                "reconnect.max_attempts must be > 0".to_string(),
            ));
        }
        if self.initial_delay_ms == 0 || self.initial_delay_ms > self.max_delay_ms {
            return Err(AppError::Config(format!(
                "reconnect delays out of range: initial {}ms, max {}ms",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Backoff delay for a given zero-based attempt, with random jitter
    /// (0-199ms) to avoid synchronized reconnect storms.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let jitter = rand::random::<u64>() % 200;
        std::cmp::min(
            self.initial_delay_ms.saturating_mul(1u64 << attempt.min(32)),
            self.max_delay_ms,
        ) + jitter
    }
}

/// What to do after the transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Intentional server-side hold; resolution arrives out of band
    /// (HTTP polling or an explicit restart signal). Do not reconnect.
    Hold { reason: String },
    /// Unexpected close; retry with backoff.
    Reconnect,
}

/// Classify a close frame. Only the normal-closure code with the known
/// hold reason suppresses reconnection; everything else retries.
pub fn close_disposition(code: u16, reason: &str) -> CloseDisposition {
    if code == CLOSE_NORMAL && reason == REASON_SESSION_WAITING {
        CloseDisposition::Hold {
            reason: reason.to_string(),
        }
    } else {
        CloseDisposition::Reconnect
    }
}

/// Reconnect with exponential backoff and jitter.
///
/// Drives `connect_fn` up to `config.max_attempts` times, sleeping the
/// configured backoff before each try. Returns the last error when every
/// attempt fails.
pub async fn reconnect_with_backoff<F, Fut>(
    config: &ReconnectConfig,
    mut connect_fn: F,
) -> Result<(), ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), ConnectionError>>,
{
    let mut last_error: Option<ConnectionError> = None;

    for attempt in 0..config.max_attempts {
        let backoff_ms = config.delay_ms(attempt);

        tracing::info!(
            attempt = attempt + 1,
            max_attempts = config.max_attempts,
            backoff_ms,
            "reconnect attempt scheduled"
        );

        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;

        match connect_fn().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(attempt = attempt + 1, error = %e, "reconnect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(ConnectionError::RetriesExhausted))
}
