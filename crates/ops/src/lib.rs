//! Cutover ops: the two scheduling primitives every operation is built from.
//!
//! [`RetryPolicy`] repeats one write with a fixed delay; [`PollLoop`] re-reads
//! a resource on an interval until a classification is terminal, the tick
//! budget runs out, or its cancellation token fires. Both suspend only on
//! tokio timers and observe cancellation at every suspension point.

#![forbid(unsafe_code)]

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod poll;
pub mod retry;

pub use poll::{LoopOutcome, PollEvent, PollLoop, PollSpec, TickReport};
pub use retry::{Retried, RetryError, RetryPolicy, RetryState};

/// Cancellation handle for an in-flight loop.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Result of starting a streaming loop.
pub struct StreamHandle<T> {
    pub rx: mpsc::Receiver<T>,
    pub cancel: CancelHandle,
}
