//! HTTP side of the session core.
//!
//! - `Transport`: one HTTP exchange, backed by `reqwest` in production
//! - `AuthApi`: the `/login`, `/refresh`, and `/logout` endpoints
//! - `ApiClient`: authenticated request gate with refresh-and-retry on `401`
//!
//! Requests carry the configured default headers plus a bearer token.

pub mod auth;
pub mod client;
pub mod error;
pub mod transport;

pub use auth::AuthApi;
pub use client::{ApiClient, ApiRequest};
pub use error::ApiError;
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, Part, RequestBody, StatusCode, Transport,
};
