//! Session and credential management.
//!
//! This module provides:
//! - `Session`: login, startup validation, logout, and role queries
//! - `CredentialStore`: persistence for the credential triple (file, keyring, or memory)
//! - `RefreshCoordinator`: single-flight refresh-token exchange
//! - `RefreshScheduler`: background timer that refreshes ahead of expiry
//!
//! Access tokens are refreshed once they are within the configured
//! threshold (5 minutes by default) of expiry.

pub mod clock;
pub mod credentials;
pub mod error;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{
    open_store, Credential, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore,
};
pub use error::{AuthError, RefreshError, StoreError};
pub use refresh::{Freshness, RefreshAttempt, RefreshCoordinator};
pub use scheduler::{RefreshScheduler, TickOutcome};
pub(crate) use session::SessionContext;
pub use session::{Session, SessionEvent, SessionStatus};
pub use token::{DecodedClaims, MalformedToken, TokenInfo};
