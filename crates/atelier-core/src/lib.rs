//! Client-side session core for the Atelier storefront and back office.
//!
//! Holds the credential triple (access token, refresh token, user profile),
//! keeps the access token fresh in the background, and gates outgoing API
//! calls so a `401` gets one refresh and one retry before the user is sent
//! back to login.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use atelier_core::{ApiRequest, Config, Session};
//!
//! let session = Session::from_config(Config::load()?)?;
//! session.initialize().await?;
//! let orders = session.client().send(ApiRequest::get("/api/orders")).await?;
//! println!("{}", orders.text());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, ApiRequest, HttpTransport, Transport};
pub use auth::{
    AuthError, Credential, CredentialStore, RefreshError, Session, SessionEvent, SessionStatus,
    TokenInfo,
};
pub use config::{Config, StorageBackend};
pub use models::{Access, AccessArea, Profile, Role};
