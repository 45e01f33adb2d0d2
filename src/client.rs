use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    call::Caller,
    config::{Endpoint, RaceConfig, RaceMode},
    errors::ConfigError,
};

/// Position of an attempt within its race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Primary => "primary",
            Slot::Secondary => "secondary",
        }
    }
}

/// Lifecycle of one attempt: `Pending` moves to exactly one of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptState {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

/// How a race ended.
#[derive(Debug)]
pub enum RaceOutcome<T> {
    /// The first attempt to succeed.
    Won {
        slot: Slot,
        endpoint: Endpoint,
        value: T,
        elapsed: Duration,
    },
    /// Every attempt failed, or the caller's deadline passed first.
    Exhausted,
}

impl<T> RaceOutcome<T> {
    /// The winning payload, or `None` as the absence signal.
    pub fn into_value(self) -> Option<T> {
        match self {
            RaceOutcome::Won { value, .. } => Some(value),
            RaceOutcome::Exhausted => None,
        }
    }

    pub fn winner(&self) -> Option<Slot> {
        match self {
            RaceOutcome::Won { slot, .. } => Some(*slot),
            RaceOutcome::Exhausted => None,
        }
    }
}

struct Attempt {
    endpoint: Endpoint,
    cancel: CancellationToken,
    state: AttemptState,
}

impl Attempt {
    fn new(endpoint: Endpoint, cancel: CancellationToken) -> Self {
        Self {
            endpoint,
            cancel,
            state: AttemptState::Pending,
        }
    }

    /// Signals cancellation if still pending. Returns whether it did.
    fn cancel(&mut self) -> bool {
        if self.state != AttemptState::Pending {
            return false;
        }
        self.state = AttemptState::Cancelled;
        self.cancel.cancel();
        true
    }
}

/// Attempts of one dispatch, indexed by slot.
struct Race {
    primary: Attempt,
    secondary: Option<Attempt>,
}

impl Race {
    fn attempt_mut(&mut self, slot: Slot) -> Option<&mut Attempt> {
        match slot {
            Slot::Primary => Some(&mut self.primary),
            Slot::Secondary => self.secondary.as_mut(),
        }
    }

    /// Cancels every attempt still pending, returning the endpoints signalled.
    fn cancel_pending(&mut self) -> Vec<Endpoint> {
        let mut cancelled = Vec::new();
        for attempt in std::iter::once(&mut self.primary).chain(self.secondary.as_mut()) {
            if attempt.cancel() {
                cancelled.push(attempt.endpoint.clone());
            }
        }
        cancelled
    }
}

#[derive(Debug, Default)]
struct EndpointStats {
    wins: u64,
    total_latency_ms: f64,
    failures: u64,
    cancellations: u64,
}

/// Snapshot of accumulated per-endpoint statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointStatsSnapshot {
    /// Number of races this endpoint won.
    pub wins: u64,
    /// Average dispatch latency in milliseconds for races this endpoint won.
    pub avg_latency_ms: f64,
    /// Number of attempts against this endpoint that failed.
    pub failures: u64,
    /// Number of attempts against this endpoint cancelled because a sibling won.
    pub cancellations: u64,
}

/// Races requests against interchangeable endpoints.
///
/// Each call to [`dispatch`](Self::dispatch) or [`race`](Self::race) owns its
/// attempts and cancellation tokens; nothing but the statistics survives the
/// call, so one dispatcher can serve many concurrent dispatches.
pub struct RacingDispatcher<C> {
    caller: Arc<C>,
    stats: Arc<Mutex<HashMap<Endpoint, EndpointStats>>>,
}

impl<C> Clone for RacingDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            caller: self.caller.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<C: Caller> RacingDispatcher<C> {
    pub fn new(caller: C) -> Self {
        Self {
            caller: Arc::new(caller),
            stats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a snapshot of statistics for every endpoint seen so far.
    pub fn endpoint_stats(&self) -> HashMap<Endpoint, EndpointStatsSnapshot> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);

        stats
            .iter()
            .map(|(endpoint, s)| {
                let avg = if s.wins > 0 {
                    s.total_latency_ms / (s.wins as f64)
                } else {
                    0.0
                };

                (
                    endpoint.clone(),
                    EndpointStatsSnapshot {
                        wins: s.wins,
                        avg_latency_ms: avg,
                        failures: s.failures,
                        cancellations: s.cancellations,
                    },
                )
            })
            .collect()
    }

    /// Runs one race and returns the winning payload, or `None` if every
    /// attempt failed.
    ///
    /// Backend failures never surface as errors; only an invalid `cfg` does,
    /// and it is rejected before any attempt is issued.
    pub async fn dispatch(&self, cfg: &RaceConfig) -> Result<Option<C::Output>, ConfigError> {
        Ok(self.race(cfg).await?.into_value())
    }

    /// Like [`dispatch`](Self::dispatch), but reports which attempt won.
    pub async fn race(&self, cfg: &RaceConfig) -> Result<RaceOutcome<C::Output>, ConfigError> {
        cfg.validate()?;
        Ok(self.run(cfg).await)
    }

    async fn run(&self, cfg: &RaceConfig) -> RaceOutcome<C::Output> {
        let start = Instant::now();
        let caller: &C = &self.caller;

        let launch = move |slot: Slot, endpoint: Endpoint, cancel: CancellationToken| async move {
            let result = caller.call(&endpoint, cancel).await;
            (slot, result)
        };

        // Tied attempts share one token; hedged attempts get one each.
        let primary_cancel = CancellationToken::new();
        let mut race = Race {
            primary: Attempt::new(cfg.primary.clone(), primary_cancel.clone()),
            secondary: None,
        };

        let mut in_flight = FuturesUnordered::new();
        in_flight.push(launch(Slot::Primary, cfg.primary.clone(), primary_cancel.clone()));

        let mut secondary = cfg.secondary.clone().filter(|_| cfg.mode.needs_secondary());
        if cfg.mode == RaceMode::Tied {
            if let Some(endpoint) = secondary.take() {
                race.secondary = Some(Attempt::new(endpoint.clone(), primary_cancel.clone()));
                in_flight.push(launch(Slot::Secondary, endpoint, primary_cancel));
            }
        }

        let mut hedge_armed = cfg.mode == RaceMode::Hedged && secondary.is_some();
        let hedge_sleep = time::sleep(cfg.hedge_after);
        tokio::pin!(hedge_sleep);

        let deadline_sleep = time::sleep(cfg.deadline.unwrap_or(Duration::MAX));
        tokio::pin!(deadline_sleep);

        loop {
            if in_flight.is_empty() && !hedge_armed {
                break;
            }

            tokio::select! {
                Some((slot, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    let Some(attempt) = race.attempt_mut(slot) else {
                        continue;
                    };

                    match result {
                        Ok(value) => {
                            attempt.state = AttemptState::Succeeded;
                            let endpoint = attempt.endpoint.clone();
                            let elapsed = start.elapsed();
                            tracing::debug!(
                                mode = %cfg.mode,
                                slot = slot.as_str(),
                                %endpoint,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "race won"
                            );

                            let cancelled = race.cancel_pending();
                            self.record_win(&endpoint, elapsed, &cancelled);

                            return RaceOutcome::Won {
                                slot,
                                endpoint,
                                value,
                                elapsed,
                            };
                        }
                        Err(err) => {
                            attempt.state = AttemptState::Failed;
                            tracing::warn!(
                                mode = %cfg.mode,
                                slot = slot.as_str(),
                                endpoint = %attempt.endpoint,
                                error = %err,
                                "{} call failed",
                                slot.as_str()
                            );
                            self.record_failure(&attempt.endpoint);

                            if slot == Slot::Primary && hedge_armed && cfg.abort_on_primary_failure {
                                hedge_armed = false;
                            }
                        }
                    }
                }
                _ = &mut hedge_sleep, if hedge_armed => {
                    hedge_armed = false;
                    if let Some(endpoint) = secondary.take() {
                        tracing::debug!(
                            hedge_after_ms = cfg.hedge_after.as_millis() as u64,
                            %endpoint,
                            "hedge delay elapsed, issuing secondary"
                        );
                        let cancel = CancellationToken::new();
                        race.secondary = Some(Attempt::new(endpoint.clone(), cancel.clone()));
                        in_flight.push(launch(Slot::Secondary, endpoint, cancel));
                    }
                }
                _ = &mut deadline_sleep, if cfg.deadline.is_some() => {
                    let cancelled = race.cancel_pending();
                    tracing::warn!(
                        mode = %cfg.mode,
                        deadline_ms = cfg.deadline.map(|d| d.as_millis() as u64),
                        cancelled = cancelled.len(),
                        "dispatch deadline elapsed"
                    );
                    self.record_cancellations(&cancelled);
                    return RaceOutcome::Exhausted;
                }
            }
        }

        tracing::debug!(mode = %cfg.mode, primary = %cfg.primary, "every attempt failed");
        RaceOutcome::Exhausted
    }

    fn with_stats(&self, f: impl FnOnce(&mut HashMap<Endpoint, EndpointStats>)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }

    fn record_win(&self, winner: &Endpoint, elapsed: Duration, cancelled: &[Endpoint]) {
        self.with_stats(|stats| {
            let entry = stats.entry(winner.clone()).or_default();
            entry.wins += 1;
            entry.total_latency_ms += elapsed.as_secs_f64() * 1000.0;
            for endpoint in cancelled {
                stats.entry(endpoint.clone()).or_default().cancellations += 1;
            }
        });
    }

    fn record_failure(&self, endpoint: &Endpoint) {
        self.with_stats(|stats| {
            stats.entry(endpoint.clone()).or_default().failures += 1;
        });
    }

    fn record_cancellations(&self, cancelled: &[Endpoint]) {
        self.with_stats(|stats| {
            for endpoint in cancelled {
                stats.entry(endpoint.clone()).or_default().cancellations += 1;
            }
        });
    }
}
