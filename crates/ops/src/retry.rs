//! Bounded retry around a single write.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed attempt budget and fixed delay between attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 6, delay_ms: 5_000 }
    }
}

/// Bookkeeping for one write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl RetryState {
    fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// Successful write plus how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts_made: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("retry budget exhausted after {attempts_made} attempts: {last_error}")]
    Exhausted { attempts_made: u32, last_error: E },
    #[error("non-retryable failure on attempt {attempts_made}: {error}")]
    Aborted { attempts_made: u32, error: E },
    #[error("canceled after {attempts_made} attempts")]
    Canceled { attempts_made: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts_made(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts_made, .. }
            | RetryError::Aborted { attempts_made, .. }
            | RetryError::Canceled { attempts_made } => *attempts_made,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self { max_attempts, delay_ms }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `write` until it succeeds, returns a non-retryable error, or the
    /// budget is spent. `write` receives the 1-based attempt number.
    ///
    /// A write in flight is never interrupted; cancellation is observed
    /// before each attempt and during the delay.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        retryable: P,
        mut write: F,
    ) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut state = RetryState { attempts_made: 0, max_attempts: self.max_attempts.max(1), delay_ms: self.delay_ms };
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Canceled { attempts_made: state.attempts_made });
            }
            state.attempts_made += 1;
            counter!("retry_attempts_total", 1u64);
            match write(state.attempts_made).await {
                Ok(value) => {
                    debug!(attempts = state.attempts_made, "retry: write ok");
                    return Ok(Retried { value, attempts_made: state.attempts_made });
                }
                Err(error) if !retryable(&error) => {
                    warn!(attempt = state.attempts_made, error = %error, "retry: non-retryable failure");
                    return Err(RetryError::Aborted { attempts_made: state.attempts_made, error });
                }
                Err(last_error) if state.exhausted() => {
                    counter!("retry_exhausted_total", 1u64);
                    warn!(attempts = state.attempts_made, error = %last_error, "retry: budget exhausted");
                    return Err(RetryError::Exhausted { attempts_made: state.attempts_made, last_error });
                }
                Err(error) => {
                    warn!(
                        attempt = state.attempts_made,
                        max = state.max_attempts,
                        delay_ms = state.delay_ms,
                        error = %error,
                        "retry: write failed; retrying"
                    );
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Canceled { attempts_made: state.attempts_made }),
                _ = tokio::time::sleep(Duration::from_millis(state.delay_ms)) => {}
            }
        }
    }
}
