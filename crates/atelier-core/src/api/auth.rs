//! Calls to the unauthenticated `/api/auth` endpoints.

use std::sync::Arc;

use reqwest::header::{self, HeaderValue};
use serde::{Deserialize, Serialize};

use super::transport::{default_headers, HttpRequest, HttpResponse, Method, RequestBody, Transport};
use super::ApiError;
use crate::auth::Credential;
use crate::config::Config;
use crate::models::Profile;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Body returned by `/login` and `/refresh`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    access_token: String,
    refresh_token: String,
    user: Profile,
    #[serde(default)]
    token_type: Option<String>,
}

impl AuthResponse {
    fn into_credential(self) -> Result<Credential, ApiError> {
        if self.access_token.is_empty() || self.refresh_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Auth response is missing a token".to_string(),
            ));
        }
        if let Some(kind) = self.token_type.as_deref() {
            if !kind.eq_ignore_ascii_case("bearer") {
                return Err(ApiError::InvalidResponse(format!(
                    "Unsupported token type '{}'",
                    kind
                )));
            }
        }
        Ok(Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user,
        })
    }
}

/// Typed wrappers for login, refresh, and logout.
#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn Transport>,
    config: Arc<Config>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<Config>) -> Self {
        Self { transport, config }
    }

    async fn post(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<HttpResponse, ApiError> {
        let mut headers = default_headers(&self.config)?;
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        self.transport
            .execute(HttpRequest {
                method: Method::POST,
                url: self.config.auth_url(endpoint),
                headers,
                body: Some(RequestBody::Json(body)),
            })
            .await
    }

    fn to_json<T: Serialize>(body: &T) -> Result<serde_json::Value, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }

    /// `POST /login`. Any status is returned; `Err` means no response.
    pub async fn login(&self, email: &str, password: &str) -> Result<HttpResponse, ApiError> {
        self.post("login", Self::to_json(&LoginRequest { email, password })?)
            .await
    }

    /// `POST /refresh`. Any status is returned; `Err` means no response.
    pub async fn refresh(&self, refresh_token: &str) -> Result<HttpResponse, ApiError> {
        self.post("refresh", Self::to_json(&RefreshTokenRequest { refresh_token })?)
            .await
    }

    /// `POST /logout`, revoking `refresh_token` server-side.
    pub async fn logout(&self, refresh_token: &str) -> Result<HttpResponse, ApiError> {
        self.post("logout", Self::to_json(&RefreshTokenRequest { refresh_token })?)
            .await
    }

    /// Parse a successful `/login` or `/refresh` body into a credential.
    pub fn credential_from(response: &HttpResponse) -> Result<Credential, ApiError> {
        response.json::<AuthResponse>()?.into_credential()
    }
}
