use std::{
    collections::VecDeque,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::broadcast, time::Instant};

const HISTORY_LEN: usize = 32;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
    pub open_timeout: Duration,
    /// Minimum time since opening before a health check may force-close.
    pub reset_timeout: Duration,
    pub half_open_max_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: 10,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(120),
            half_open_max_probes: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionReason {
    FailureThreshold,
    ProbeFailed,
    OpenTimeoutElapsed,
    ProbesSucceeded,
    HealthCheckRecovered,
    HealthCheckClosed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerTransition {
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
    pub reason: TransitionReason,
}

#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error("circuit is open")]
    Open,
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub open_for_ms: Option<u64>,
    pub probes_in_flight: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub recent_transitions: Vec<BreakerTransition>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
    history: VecDeque<BreakerTransition>,
    /// Bumped on every transition.
    generation: u64,
}

enum Outcome {
    Success,
    Failure,
    Ignored,
}

/// Failure-tracking guard around one remote dependency.
///
/// All transitions happen while holding the single state mutex, and every
/// transition is published on a broadcast channel (see [`CircuitBreaker::subscribe`]).
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    events: broadcast::Sender<BreakerTransition>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        CircuitBreaker {
            name: name.to_string(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                probes_in_flight: 0,
                total_calls: 0,
                total_failures: 0,
                total_rejections: 0,
                history: VecDeque::with_capacity(HISTORY_LEN),
                generation: 0,
            }),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakerTransition> {
        self.events.subscribe()
    }

    /// Runs `f` if the breaker admits it. Every error counts as a failure.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_with(f, |_| true).await
    }

    /// Like [`CircuitBreaker::call`], but `is_failure` decides which errors
    /// count against the breaker. Errors it rejects leave the counters alone.
    pub async fn call_with<T, E, F, Fut, P>(&self, f: F, is_failure: P) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let permit = self.acquire().ok_or(CallError::Open)?;

        let result = f().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => match is_failure(e) {
                true => Outcome::Failure,
                false => Outcome::Ignored,
            },
        };
        permit.complete(outcome);

        result.map_err(CallError::Inner)
    }

    /// Feeds an out-of-band health probe result. Only healthy reports move
    /// the breaker: Open goes to HalfOpen, and HalfOpen closes once
    /// `reset_timeout` has passed since the breaker opened.
    pub fn record_health(&self, healthy: bool) {
        if !healthy {
            return;
        }

        let mut inner = self.lock();
        match inner.state {
            CircuitState::Open => {
                inner.consecutive_successes = 0;
                self.transition(
                    &mut inner,
                    CircuitState::HalfOpen,
                    TransitionReason::HealthCheckRecovered,
                );
            }
            CircuitState::HalfOpen => {
                let waited_long_enough = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if waited_long_enough {
                    Self::reset_counters(&mut inner);
                    self.transition(
                        &mut inner,
                        CircuitState::Closed,
                        TransitionReason::HealthCheckClosed,
                    );
                }
            }
            CircuitState::Closed => {}
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            open_for_ms: match inner.state {
                CircuitState::Closed => None,
                _ => inner.opened_at.map(|at| at.elapsed().as_millis() as u64),
            },
            probes_in_flight: inner.probes_in_flight,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
            recent_transitions: inner.history.iter().cloned().collect(),
        }
    }

    fn acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map_or(true, |at| at.elapsed() >= self.config.open_timeout);
            if elapsed {
                inner.consecutive_successes = 0;
                self.transition(
                    &mut inner,
                    CircuitState::HalfOpen,
                    TransitionReason::OpenTimeoutElapsed,
                );
            }
        }

        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen if inner.probes_in_flight < self.config.half_open_max_probes => {
                inner.probes_in_flight += 1;
                true
            }
            _ => {
                inner.total_rejections += 1;
                return None;
            }
        };
        inner.total_calls += 1;

        Some(CallPermit {
            breaker: self,
            probe,
            generation: inner.generation,
            completed: false,
        })
    }

    fn on_outcome(&self, inner: &mut Inner, outcome: Outcome) {
        match outcome {
            Outcome::Ignored => {}
            Outcome::Success => match inner.state {
                CircuitState::Closed => inner.consecutive_failures = 0,
                CircuitState::HalfOpen => {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        Self::reset_counters(inner);
                        self.transition(
                            inner,
                            CircuitState::Closed,
                            TransitionReason::ProbesSucceeded,
                        );
                    }
                }
                CircuitState::Open => {}
            },
            Outcome::Failure => {
                inner.total_failures += 1;
                match inner.state {
                    CircuitState::Closed => {
                        inner.consecutive_failures += 1;
                        if inner.consecutive_failures >= self.config.failure_threshold {
                            self.trip(inner, TransitionReason::FailureThreshold);
                        }
                    }
                    CircuitState::HalfOpen => {
                        inner.consecutive_failures += 1;
                        self.trip(inner, TransitionReason::ProbeFailed);
                    }
                    CircuitState::Open => {}
                }
            }
        }
    }

    fn trip(&self, inner: &mut Inner, reason: TransitionReason) {
        inner.opened_at = Some(Instant::now());
        inner.consecutive_successes = 0;
        self.transition(inner, CircuitState::Open, reason);
    }

    fn reset_counters(inner: &mut Inner) {
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, reason: TransitionReason) {
        let event = BreakerTransition {
            breaker: self.name.clone(),
            from: inner.state,
            to,
            at: Utc::now(),
            reason,
        };
        inner.state = to;
        inner.generation += 1;

        if inner.history.len() == HISTORY_LEN {
            inner.history.pop_front();
        }
        inner.history.push_back(event.clone());

        // No subscribers is fine.
        _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission ticket for one call. Dropping it without completing (the
/// caller's future was cancelled) frees the probe slot and records nothing.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    generation: u64,
    completed: bool,
}

impl CallPermit<'_> {
    fn complete(mut self, outcome: Outcome) {
        self.completed = true;
        let mut inner = self.breaker.lock();
        if self.probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }

        // Admitted before the last transition: only the totals see it.
        if inner.generation != self.generation {
            if let Outcome::Failure = outcome {
                inner.total_failures += 1;
            }
            return;
        }
        self.breaker.on_outcome(&mut inner, outcome);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.completed {
            let mut inner = self.breaker.lock();
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }
}

/// Logs every breaker transition. Runs until the breaker is dropped.
pub async fn transition_logger_handler(mut receiver: broadcast::Receiver<BreakerTransition>) {
    log::info!("Started circuit breaker transition logger");

    loop {
        match receiver.recv().await {
            Ok(event) => match event.to {
                CircuitState::Open => log::warn!(
                    "Circuit {} opened ({:?} -> {:?}) reason: {:?}",
                    event.breaker,
                    event.from,
                    event.to,
                    event.reason
                ),
                _ => log::info!(
                    "Circuit {} moved {:?} -> {:?} reason: {:?}",
                    event.breaker,
                    event.from,
                    event.to,
                    event.reason
                ),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Transition logger lagged, skipped {} events", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
