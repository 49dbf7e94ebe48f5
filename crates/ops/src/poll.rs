//! Cancellable poll loop: read, classify, then either stop or sleep.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cutover_core::{ClassificationResult, ClientError, ClientResult};

use crate::{CancelHandle, StreamHandle};

/// Tick interval and optional tick budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollSpec {
    pub interval_ms: u64,
    pub max_ticks: Option<u32>,
}

impl PollSpec {
    pub fn every(interval_ms: u64) -> Self {
        Self { interval_ms, max_ticks: None }
    }

    pub fn with_max_ticks(mut self, ticks: u32) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// How a loop ended. Every variant is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopOutcome {
    Terminal(ClassificationResult),
    TimedOut { ticks: u32 },
    Canceled { ticks: u32 },
}

impl LoopOutcome {
    /// Result to surface to callers; `None` for an intentional stop.
    pub fn result(&self) -> Option<ClassificationResult> {
        match self {
            LoopOutcome::Terminal(r) => Some(r.clone()),
            LoopOutcome::TimedOut { ticks } => Some(ClassificationResult::timed_out(*ticks)),
            LoopOutcome::Canceled { .. } => None,
        }
    }
}

/// What happened on one tick, handed to the caller's observer.
#[derive(Debug)]
pub enum TickReport<'a, T> {
    Observed { tick: u32, observed: &'a T, result: &'a ClassificationResult },
    ReadFailed { tick: u32, error: &'a ClientError },
}

/// Events of a spawned loop.
#[derive(Debug, Clone)]
pub enum PollEvent<T> {
    Tick { tick: u32, observed: T, result: ClassificationResult },
    ReadFailed { tick: u32, error: ClientError },
    Finished(LoopOutcome),
}

/// One loop instance; `label` names it in logs and metrics.
#[derive(Debug, Clone)]
pub struct PollLoop {
    label: String,
    spec: PollSpec,
}

impl PollLoop {
    pub fn new(label: impl Into<String>, spec: PollSpec) -> Self {
        Self { label: label.into(), spec }
    }

    pub fn spec(&self) -> PollSpec {
        self.spec
    }

    /// Drive the loop to completion.
    ///
    /// Each tick issues exactly one `probe` and classifies its result; the
    /// next probe is only issued after the previous classification. A read
    /// failure is not a classification: it is reported and the loop keeps
    /// going. Cancellation wins over a result that became ready in the same
    /// turn, so nothing terminal is reported after a stop.
    pub async fn run<T, P, Fut, C, R>(&self, cancel: &CancellationToken, mut probe: P, classify: C, mut observe: R) -> LoopOutcome
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
        C: Fn(&T) -> ClassificationResult,
        R: FnMut(TickReport<'_, T>),
    {
        let label = self.label.as_str();
        let mut ticks: u32 = 0;
        debug!(loop_name = %label, interval_ms = self.spec.interval_ms, max_ticks = ?self.spec.max_ticks, "poll: start");
        loop {
            if cancel.is_cancelled() {
                return self.canceled(ticks);
            }
            ticks += 1;
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.canceled(ticks),
                read = probe() => read,
            };
            if cancel.is_cancelled() {
                return self.canceled(ticks);
            }
            counter!("poll_ticks_total", 1u64, "loop" => label.to_string());
            match read {
                Ok(observed) => {
                    let result = classify(&observed);
                    debug!(loop_name = %label, tick = ticks, status = %result.status, "poll: tick");
                    observe(TickReport::Observed { tick: ticks, observed: &observed, result: &result });
                    if result.is_terminal() {
                        info!(loop_name = %label, ticks, status = %result.status, "poll: terminal");
                        return LoopOutcome::Terminal(result);
                    }
                }
                Err(error) => {
                    counter!("poll_read_errors_total", 1u64, "loop" => label.to_string());
                    warn!(loop_name = %label, tick = ticks, error = %error, "poll: read failed; continuing");
                    observe(TickReport::ReadFailed { tick: ticks, error: &error });
                }
            }
            if let Some(max) = self.spec.max_ticks {
                if ticks >= max {
                    info!(loop_name = %label, ticks, "poll: tick budget exhausted");
                    return LoopOutcome::TimedOut { ticks };
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.canceled(ticks),
                _ = tokio::time::sleep(self.spec.interval()) => {}
            }
        }
    }

    fn canceled(&self, ticks: u32) -> LoopOutcome {
        info!(loop_name = %self.label, ticks, "poll: canceled");
        LoopOutcome::Canceled { ticks }
    }

    /// Run on a background task and stream every tick.
    ///
    /// Tick events are dropped when the receiver lags behind `buffer`; the
    /// final `Finished` event is always delivered while the receiver lives.
    pub fn spawn<T, P, Fut, C>(self, buffer: usize, probe: P, classify: C) -> StreamHandle<PollEvent<T>>
    where
        T: Clone + Send + 'static,
        P: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ClientResult<T>> + Send,
        C: Fn(&T) -> ClassificationResult + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancelHandle::new();
        let token = cancel.token().clone();
        tokio::spawn(async move {
            let ticks_tx = tx.clone();
            let outcome = self
                .run(&token, probe, classify, |report| {
                    let ev = match report {
                        TickReport::Observed { tick, observed, result } => {
                            PollEvent::Tick { tick, observed: observed.clone(), result: result.clone() }
                        }
                        TickReport::ReadFailed { tick, error } => PollEvent::ReadFailed { tick, error: error.clone() },
                    };
                    let _ = ticks_tx.try_send(ev);
                })
                .await;
            let _ = tx.send(PollEvent::Finished(outcome)).await;
        });
        StreamHandle { rx, cancel }
    }
}
