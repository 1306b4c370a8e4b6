//! Authenticated request gate.
//!
//! Every call made through [`ApiClient`] carries the session's bearer token.
//! A `401` triggers one refresh and exactly one resend of the same request;
//! if the refresh fails the session is purged and the caller gets
//! [`ApiError::SessionExpired`] instead of the raw `401`.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::transport::{
    default_headers, header_pair, HttpRequest, HttpResponse, Method, Part, RequestBody, StatusCode,
};
use super::ApiError;
use crate::auth::SessionContext;

/// An API call to be sent through the gate.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, or an absolute URL
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::PUT, target)
    }

    pub fn patch(target: impl Into<String>) -> Self {
        Self::new(Method::PATCH, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Body is not serializable: {}", e)))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn binary(mut self, data: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Binary(data));
        self
    }

    pub fn multipart(mut self, parts: Vec<Part>) -> Self {
        self.body = Some(RequestBody::Multipart(parts));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Request gate bound to a session.
/// Clone is cheap - the session context is shared.
#[derive(Clone)]
pub struct ApiClient {
    ctx: Arc<SessionContext>,
}

impl ApiClient {
    pub(crate) fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Send `request` with the current access token.
    ///
    /// Non-`401` responses are returned untouched, success or not.
    pub async fn send(&self, request: ApiRequest) -> Result<HttpResponse, ApiError> {
        let token = self.ctx.access_token()?.ok_or(ApiError::Unauthenticated)?;

        let response = self.dispatch(&request, &token).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(target = %request.target, "Got 401, refreshing token before one retry");
        if let Err(e) = self.ctx.coordinator.refresh().await {
            warn!(error = %e, target = %request.target, "Refresh after 401 failed, ending session");
            self.ctx.expire();
            return Err(ApiError::SessionExpired);
        }

        let Some(token) = self.ctx.access_token()? else {
            warn!("Credential vanished after refresh, ending session");
            self.ctx.expire();
            return Err(ApiError::SessionExpired);
        };
        self.dispatch(&request, &token).await
    }

    fn build_headers(&self, request: &ApiRequest, token: &str) -> Result<HeaderMap, ApiError> {
        let mut headers = default_headers(&self.ctx.config)?;
        for (name, value) in &request.headers {
            let (name, value) = header_pair(name, value)?;
            headers.insert(name, value);
        }

        let bearer = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            ApiError::InvalidRequest("Access token is not a valid header value".into())
        })?;
        headers.insert(header::AUTHORIZATION, bearer);

        // Binary and multipart bodies let the transport set the type and boundary.
        if request.body.as_ref().is_some_and(RequestBody::is_opaque) {
            headers.remove(header::CONTENT_TYPE);
        } else {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }

    async fn dispatch(&self, request: &ApiRequest, token: &str) -> Result<HttpResponse, ApiError> {
        let http = HttpRequest {
            method: request.method.clone(),
            url: self.ctx.config.resolve(&request.target),
            headers: self.build_headers(request, token)?,
            body: request.body.clone(),
        };
        self.ctx.transport.execute(http).await
    }

    async fn send_for<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let target = request.target.clone();
        let response = self.send(request).await?.error_for_status()?;
        response.json().map_err(|e| {
            warn!(target = %target, error = %e, "Failed to parse response");
            e
        })
    }

    // ===== Typed helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, target: &str) -> Result<T, ApiError> {
        self.send_for(ApiRequest::get(target)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        target: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_for(ApiRequest::post(target).json(body)?).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        target: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_for(ApiRequest::put(target).json(body)?).await
    }

    /// `DELETE target`, ignoring any response body.
    pub async fn delete(&self, target: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(target)).await?.error_for_status()?;
        Ok(())
    }
}
