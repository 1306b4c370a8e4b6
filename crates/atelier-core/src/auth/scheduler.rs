//! Proactive background refresh.
//!
//! While running, the scheduler wakes every `interval` and refreshes the
//! credential if the access token is missing, malformed, or within
//! `threshold` of expiry. The interval must be shorter than the threshold so
//! no token can expire between two ticks.
//!
//! A failure the session cannot recover from (no refresh token, a rejected
//! refresh token, a broken store) broadcasts [`SessionEvent::Expired`] and
//! stops the timer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::refresh::{Freshness, RefreshAttempt, RefreshCoordinator};
use super::{Clock, RefreshError, SessionEvent};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Token still valid for this long; nothing to do.
    Fresh(chrono::Duration),
    Refreshed,
    /// A refresh was already in flight.
    Skipped,
    Failed(RefreshError),
}

impl TickOutcome {
    /// Whether the session is gone and the timer should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TickOutcome::Failed(e) if !e.is_transient())
    }
}

pub struct RefreshScheduler {
    coordinator: Arc<RefreshCoordinator>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    threshold: chrono::Duration,
    events: broadcast::Sender<SessionEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        threshold: chrono::Duration,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            coordinator,
            clock,
            interval,
            threshold,
            events,
            task: Mutex::new(None),
        }
    }

    /// Arm the timer. Does nothing if already running.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Refresh scheduler already running");
            return;
        }

        let coordinator = Arc::clone(&self.coordinator);
        let clock = Arc::clone(&self.clock);
        let threshold = self.threshold;
        let period = self.interval;
        let events = self.events.clone();

        *task = Some(tokio::spawn(async move {
            // First check one period from now; the session was just validated.
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let outcome = run_tick(&coordinator, clock.now(), threshold).await;
                if outcome.is_terminal() {
                    expired(&events);
                    break;
                }
            }
        }));
        info!(interval_secs = period.as_secs(), "Refresh scheduler started");
    }

    /// Cancel the timer. An exchange already in flight still completes.
    pub fn stop(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Refresh scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run one check as the timer would at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let outcome = run_tick(&self.coordinator, now, self.threshold).await;
        if outcome.is_terminal() {
            self.stop();
            expired(&self.events);
        }
        outcome
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn expired(events: &broadcast::Sender<SessionEvent>) {
    warn!("Session can no longer be renewed, stopping refresh scheduler");
    let _ = events.send(SessionEvent::Expired);
}

async fn run_tick(
    coordinator: &RefreshCoordinator,
    now: DateTime<Utc>,
    threshold: chrono::Duration,
) -> TickOutcome {
    // A store that cannot be read is treated like a missing credential.
    let freshness = coordinator.freshness(now, threshold).unwrap_or_else(|e| {
        warn!(error = %e, "Could not read credential store");
        Freshness::Missing
    });

    if let Freshness::Fresh(remaining) = freshness {
        debug!(minutes = remaining.num_minutes(), "Token still valid");
        return TickOutcome::Fresh(remaining);
    }

    debug!(?freshness, "Token needs refresh");
    match coordinator.refresh_or_skip().await {
        RefreshAttempt::Skipped => TickOutcome::Skipped,
        RefreshAttempt::Completed(Ok(())) => TickOutcome::Refreshed,
        RefreshAttempt::Completed(Err(e)) => {
            if e.is_transient() {
                warn!(error = %e, "Scheduled refresh failed, will retry next tick");
            } else {
                error!(error = %e, "Scheduled refresh failed");
            }
            TickOutcome::Failed(e)
        }
    }
}
