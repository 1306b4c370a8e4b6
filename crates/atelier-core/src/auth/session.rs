//! Session lifecycle: login, startup validation, logout.
//!
//! A `Session` is the single context object for one logged-in user. It owns
//! the refresh coordinator (and with it the single-flight slot) and the
//! scheduler, and hands out [`ApiClient`]s bound to itself. Nothing here is
//! global; dropping the session stops its scheduler.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::refresh::RefreshCoordinator;
use super::scheduler::RefreshScheduler;
use super::token::TokenInfo;
use super::{AuthError, Clock, CredentialStore, RefreshError, SystemClock};
use crate::api::transport::{HttpTransport, Transport};
use crate::api::{ApiClient, ApiError, AuthApi};
use crate::config::Config;
use crate::models::{self, Access, AccessArea, Profile, Role};

/// Buffer size for the session event channel.
/// Subscribers that fall further behind than this miss older events.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Notifications for UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new credential pair was stored.
    Refreshed,
    /// The session could not be renewed and was purged; send the user to login.
    Expired,
    /// The user logged out.
    LoggedOut,
}

/// Result of [`Session::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NotAuthenticated,
    Active,
}

pub(crate) struct SessionContext {
    pub(crate) config: Arc<Config>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) auth_api: AuthApi,
    pub(crate) coordinator: Arc<RefreshCoordinator>,
    pub(crate) scheduler: RefreshScheduler,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    pub(crate) fn access_token(&self) -> Result<Option<String>, ApiError> {
        Ok(self
            .store
            .get()?
            .map(|c| c.access_token)
            .filter(|t| !t.is_empty()))
    }

    /// Forced logout after a failed renewal: stop refreshing, purge, notify.
    pub(crate) fn expire(&self) {
        self.scheduler.stop();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential after session expiry");
        }
        let _ = self.events.send(SessionEvent::Expired);
        info!("Session expired");
    }
}

#[derive(Clone)]
pub struct Session {
    ctx: Arc<SessionContext>,
}

impl Session {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let auth_api = AuthApi::new(Arc::clone(&transport), Arc::clone(&config));
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            auth_api.clone(),
            events.clone(),
        ));
        let scheduler = RefreshScheduler::new(
            Arc::clone(&coordinator),
            Arc::clone(&clock),
            config.refresh_interval(),
            config.refresh_threshold(),
            events.clone(),
        );

        Self {
            ctx: Arc::new(SessionContext {
                config,
                transport,
                store,
                auth_api,
                coordinator,
                scheduler,
                clock,
                events,
            }),
        }
    }

    /// Build a session with the HTTP transport, the configured store, and the
    /// system clock.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config)?);
        let store = super::open_store(&config)?;
        Ok(Self::new(config, transport, store, Arc::new(SystemClock)))
    }

    pub(crate) fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Request gate bound to this session.
    pub fn client(&self) -> ApiClient {
        ApiClient::new(Arc::clone(&self.ctx))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.ctx.events.subscribe()
    }

    /// Log in with email and password, store the credential, and start
    /// keeping it fresh. A failed login leaves any stored credential alone.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionStatus, AuthError> {
        let response = self.ctx.auth_api.login(email, password).await?;
        if !response.is_success() {
            warn!(status = response.status.as_u16(), "Login rejected");
            return Err(ApiError::from_status(response.status, &response.text()).into());
        }

        let credential = AuthApi::credential_from(&response)?;
        self.ctx.store.set(&credential)?;
        info!(user = %credential.user.email, "Logged in");
        self.initialize().await
    }

    /// Validate a stored session and start the refresh scheduler.
    ///
    /// If the access token is expired, malformed, or close to expiry, it is
    /// refreshed first; the scheduler only starts once that has succeeded.
    pub async fn initialize(&self) -> Result<SessionStatus, AuthError> {
        if !self.ctx.store.is_present()? {
            debug!("No stored credential");
            return Ok(SessionStatus::NotAuthenticated);
        }

        let now = self.ctx.clock.now();
        let freshness = self
            .ctx
            .coordinator
            .freshness(now, self.ctx.config.refresh_threshold())?;
        if freshness.needs_refresh() {
            info!(?freshness, "Refreshing stored session before use");
            self.ctx.coordinator.refresh().await?;
        } else {
            debug!(?freshness, "Stored session is valid");
        }

        self.ctx.scheduler.start();
        Ok(SessionStatus::Active)
    }

    /// Log out: stop refreshing, revoke the refresh token on a best-effort
    /// basis, and clear the local credential.
    ///
    /// Revocation failures are logged and otherwise ignored; the local
    /// session is always torn down.
    pub async fn terminate(&self) -> Result<(), AuthError> {
        self.ctx.scheduler.stop();

        let credential = self.ctx.store.get().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read credential for revocation");
            None
        });
        if let Some(credential) = credential {
            match self.ctx.auth_api.logout(&credential.refresh_token).await {
                Ok(response) if response.is_success() => debug!("Refresh token revoked"),
                Ok(response) => {
                    warn!(status = response.status.as_u16(), "Server refused logout, continuing")
                }
                Err(e) => warn!(error = %e, "Error during logout, continuing"),
            }
        }

        self.ctx.store.clear()?;
        let _ = self.ctx.events.send(SessionEvent::LoggedOut);
        info!("Logged out");
        Ok(())
    }

    /// Refresh now, regardless of expiry.
    pub async fn force_refresh(&self) -> Result<(), RefreshError> {
        info!("Force refreshing token");
        let result = self.ctx.coordinator.refresh().await;
        match &result {
            Ok(()) => info!(token = ?self.token_info(), "Token refreshed"),
            Err(e) => warn!(error = %e, "Forced refresh failed"),
        }
        result
    }

    pub fn is_refresh_scheduled(&self) -> bool {
        self.ctx.scheduler.is_running()
    }

    pub fn is_refreshing(&self) -> bool {
        self.ctx.coordinator.is_refreshing()
    }

    // ===== Read-only queries for outer layers =====

    /// The logged-in user, if any.
    pub fn user(&self) -> Option<Profile> {
        match self.ctx.store.get() {
            Ok(credential) => credential.map(|c| c.user),
            Err(e) => {
                warn!(error = %e, "Could not read credential store");
                None
            }
        }
    }

    /// Whether an access token is stored. Does not check expiry.
    pub fn is_authenticated(&self) -> bool {
        self.ctx.store.is_present().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read credential store");
            false
        })
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.user().is_some_and(|u| u.has_role(role))
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|u| u.is_admin())
    }

    pub fn is_customer(&self) -> bool {
        self.user().is_some_and(|u| u.is_customer())
    }

    pub fn is_staff(&self) -> bool {
        self.user().is_some_and(|u| u.is_staff())
    }

    pub fn is_staff_product(&self) -> bool {
        self.user().is_some_and(|u| u.is_staff_product())
    }

    pub fn is_staff_sales(&self) -> bool {
        self.user().is_some_and(|u| u.is_staff_sales())
    }

    pub fn role_display(&self) -> &'static str {
        self.user().map(|u| u.role_display()).unwrap_or("User")
    }

    pub fn check_access(&self, area: AccessArea) -> Access {
        models::check_access(self.user().as_ref(), area)
    }

    pub fn home_route(&self) -> &'static str {
        models::home_route(self.user().as_ref())
    }

    /// Diagnostics for the stored access token at the session clock's "now".
    pub fn token_info(&self) -> TokenInfo {
        let token = self.ctx.access_token().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read credential store");
            None
        });
        TokenInfo::inspect(token.as_deref(), self.ctx.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RequestBody;
    use crate::testing::{
        auth_body, credential, t0, token, Harness, Reply, LOGIN, LOGOUT, REFRESH,
    };

    #[tokio::test]
    async fn test_initialize_without_credential() {
        let h = Harness::new(None);

        assert_eq!(h.session.initialize().await.unwrap(), SessionStatus::NotAuthenticated);
        assert!(!h.session.is_refresh_scheduled());
        assert_eq!(h.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_initialize_valid_session_starts_scheduler_without_refresh() {
        let h = Harness::new(Some(credential(&token("t0", t0(), 10), "R0")));

        assert_eq!(h.session.initialize().await.unwrap(), SessionStatus::Active);
        assert!(h.session.is_refresh_scheduled());
        assert_eq!(h.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_initialize_refreshes_expiring_session_first() {
        let h = Harness::new(Some(credential(&token("t0", t0(), 2), "R0")));
        h.transport
            .on(REFRESH, Reply::ok(auth_body(&token("t1", t0(), 15), "R1")));

        assert_eq!(h.session.initialize().await.unwrap(), SessionStatus::Active);
        assert_eq!(h.transport.calls(REFRESH), 1);
        assert_eq!(h.stored().unwrap().refresh_token, "R1");
        assert!(h.session.is_refresh_scheduled());
    }

    #[tokio::test]
    async fn test_initialize_failure_keeps_scheduler_stopped() {
        let h = Harness::new(Some(credential(&token("t0", t0(), -1), "R0")));
        h.transport.on(REFRESH, Reply::status(401));

        let err = h.session.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Refresh(RefreshError::Rejected { status: 401 })
        ));
        assert!(!h.session.is_refresh_scheduled());
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_initialize_transient_failure_keeps_credential() {
        let original = credential(&token("t0", t0(), -1), "R0");
        let h = Harness::new(Some(original.clone()));
        h.transport.on(REFRESH, Reply::NoResponse);

        assert!(h.session.initialize().await.is_err());
        assert!(!h.session.is_refresh_scheduled());
        assert_eq!(h.stored(), Some(original));
    }

    #[tokio::test]
    async fn test_login_stores_credential_and_starts_scheduler() {
        let h = Harness::new(None);
        h.transport
            .on(LOGIN, Reply::ok(auth_body(&token("t0", t0(), 15), "R0")));

        let status = h.session.login("an@shop.vn", "hunter2").await.unwrap();

        assert_eq!(status, SessionStatus::Active);
        assert!(h.session.is_authenticated());
        assert!(h.session.is_customer());
        assert!(h.session.is_refresh_scheduled());
        match &h.transport.requests_to(LOGIN)[0].body {
            Some(RequestBody::Json(body)) => {
                assert_eq!(body["email"], "an@shop.vn");
                assert_eq!(body["password"], "hunter2");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_login_leaves_store_untouched() {
        let h = Harness::new(None);
        h.transport.on(LOGIN, Reply::Status(401, "bad credentials".into()));

        let err = h.session.login("an@shop.vn", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::Api(ApiError::Unauthorized)));
        assert!(h.stored().is_none());
        assert!(!h.session.is_refresh_scheduled());
    }

    #[tokio::test]
    async fn test_terminate_revokes_and_clears() {
        let h = Harness::new(Some(credential(&token("t0", t0(), 10), "R0")));
        h.transport.on(LOGOUT, Reply::ok("{}"));
        h.session.initialize().await.unwrap();
        let mut events = h.session.subscribe();

        h.session.terminate().await.unwrap();

        assert!(!h.session.is_refresh_scheduled());
        assert!(h.stored().is_none());
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::LoggedOut));
        match &h.transport.requests_to(LOGOUT)[0].body {
            Some(RequestBody::Json(body)) => assert_eq!(body["refreshToken"], "R0"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminate_survives_revocation_failure() {
        for reply in [Reply::NoResponse, Reply::status(500)] {
            let h = Harness::new(Some(credential(&token("t0", t0(), 10), "R0")));
            h.transport.on(LOGOUT, reply);

            h.session.terminate().await.unwrap();
            assert!(h.stored().is_none());
        }
    }

    #[tokio::test]
    async fn test_terminate_when_logged_out_skips_revocation() {
        let h = Harness::new(None);

        h.session.terminate().await.unwrap();
        assert_eq!(h.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_role_queries_follow_store() {
        let h = Harness::new(None);
        assert!(h.session.user().is_none());
        assert_eq!(h.session.check_access(AccessArea::Orders), Access::LoginRequired);
        assert_eq!(h.session.home_route(), "/login");

        let mut admin = credential(&token("t0", t0(), 10), "R0");
        admin.user = Profile::new("boss@shop.vn", [Role::Admin]);
        h.store.set(&admin).unwrap();

        assert!(h.session.is_admin());
        assert!(!h.session.is_staff());
        assert_eq!(h.session.role_display(), "Administrator");
        assert!(h.session.check_access(AccessArea::Users).is_allowed());
        assert_eq!(h.session.home_route(), "/dashboard");
    }

    #[tokio::test]
    async fn test_token_info_uses_session_clock() {
        let h = Harness::new(Some(credential(&token("t0", t0(), 30), "R0")));
        assert!(h.session.token_info().is_valid());

        h.clock.advance(chrono::Duration::minutes(31));
        assert!(!h.session.token_info().is_valid());
    }

    #[tokio::test]
    async fn test_force_refresh() {
        let h = Harness::new(Some(credential(&token("t0", t0(), 30), "R0")));
        h.transport
            .on(REFRESH, Reply::ok(auth_body(&token("t1", t0(), 30), "R1")));

        h.session.force_refresh().await.unwrap();
        assert_eq!(h.transport.calls(REFRESH), 1);
        assert_eq!(h.stored().unwrap().refresh_token, "R1");
    }
}
