//! Refresh-token exchange with a process-wide single-flight guard.
//!
//! Refresh tokens rotate on every use, so two exchanges racing on the same
//! token would invalidate each other. At most one exchange runs at a time:
//! callers arriving while one is in flight either join it ([`RefreshCoordinator::refresh`])
//! or skip their turn ([`RefreshCoordinator::refresh_or_skip`]).
//!
//! The in-flight slot is filled before the network call starts and emptied
//! only after the outcome has been written to the credential store.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{token, CredentialStore, RefreshError, SessionEvent, StoreError};
use crate::api::{ApiError, AuthApi};

type RefreshOutcome = Result<(), RefreshError>;
type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// How close the stored access token is to expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// No credential stored.
    Missing,
    /// The access token could not be decoded.
    Malformed,
    /// Expired, or within the refresh threshold.
    Expiring(Duration),
    Fresh(Duration),
}

impl Freshness {
    /// Unified policy: anything but `Fresh` gets refreshed.
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Freshness::Fresh(_))
    }
}

/// Result of a non-waiting refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshAttempt {
    /// Another refresh was already running; assumed to succeed.
    Skipped,
    Completed(RefreshOutcome),
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    api: AuthApi,
    events: broadcast::Sender<SessionEvent>,
    in_flight: Mutex<Option<InFlight>>,
}

pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        api: AuthApi,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                api,
                events,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Whether an exchange is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.inner.slot().is_some()
    }

    /// Classify the stored access token against `threshold` at `now`.
    pub fn freshness(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Freshness, StoreError> {
        let Some(credential) = self.inner.store.get()? else {
            return Ok(Freshness::Missing);
        };
        Ok(match token::time_until_expiry(&credential.access_token, now) {
            Ok(remaining) if remaining <= threshold => Freshness::Expiring(remaining),
            Ok(remaining) => Freshness::Fresh(remaining),
            Err(e) => {
                warn!(error = %e, "Stored access token is malformed");
                Freshness::Malformed
            }
        })
    }

    /// Refresh the credential, joining an exchange that is already running.
    ///
    /// The caller joins (or starts) the exchange when this is called, not
    /// when the returned future is first polled.
    pub fn refresh(&self) -> impl Future<Output = RefreshOutcome> + Send + 'static {
        let (flight, started) = self.join_or_start();
        if !started {
            debug!("Refresh already in progress, waiting for it");
        }
        flight
    }

    /// Refresh unless an exchange is already running, in which case resolve
    /// to `Skipped` without waiting.
    pub fn refresh_or_skip(&self) -> impl Future<Output = RefreshAttempt> + Send + 'static {
        let (flight, started) = self.join_or_start();
        if !started {
            debug!("Token refresh already in progress, skipping");
        }
        async move {
            if started {
                RefreshAttempt::Completed(flight.await)
            } else {
                RefreshAttempt::Skipped
            }
        }
    }

    fn join_or_start(&self) -> (InFlight, bool) {
        let mut slot = self.inner.slot();
        if let Some(flight) = slot.as_ref() {
            return (flight.clone(), false);
        }

        let inner = Arc::clone(&self.inner);
        let flight = async move {
            let outcome = inner.exchange().await;
            *inner.slot() = None;
            outcome
        }
        .boxed()
        .shared();
        *slot = Some(flight.clone());
        drop(slot);

        // Driven on its own task so it commits even if every caller goes away.
        tokio::spawn(flight.clone());
        (flight, true)
    }
}

impl Inner {
    fn slot(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn exchange(&self) -> RefreshOutcome {
        let refresh_token = match self.store.get()? {
            Some(credential) if !credential.refresh_token.is_empty() => credential.refresh_token,
            _ => {
                warn!("No refresh token found, cannot refresh access token");
                return Err(RefreshError::NoRefreshToken);
            }
        };

        info!("Attempting to refresh access token");
        let response = match self.api.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Refresh request got no response, keeping session");
                return Err(RefreshError::Transient(e.to_string()));
            }
        };

        let status = response.status;
        if status.is_success() {
            let credential = AuthApi::credential_from(&response).map_err(|e| {
                error!(error = %e, "Refresh response could not be parsed");
                RefreshError::InvalidResponse(e.to_string())
            })?;
            self.store.set(&credential)?;
            info!(user = %credential.user.email, "Access token refreshed");
            // No subscribers is fine.
            let _ = self.events.send(SessionEvent::Refreshed);
            return Ok(());
        }

        error!(
            status = status.as_u16(),
            body = %ApiError::truncate_body(&response.text()),
            "Failed to refresh token"
        );
        match status.as_u16() {
            400 | 401 | 500 => {
                warn!(status = status.as_u16(), "Refresh token rejected, clearing credential");
                self.store.clear()?;
                Err(RefreshError::Rejected {
                    status: status.as_u16(),
                })
            }
            other => Err(RefreshError::UnexpectedStatus(other)),
        }
    }
}
