//! HTTP transport seam.
//!
//! Everything the session core sends over the network goes through
//! [`Transport`]. The production implementation wraps `reqwest`; tests plug in
//! a scripted transport.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part as FormPart};
use reqwest::Client;
use serde::de::DeserializeOwned;

pub use reqwest::{Method, StatusCode};

use super::ApiError;
use crate::config::Config;

/// One field of a multipart upload.
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub file_name: Option<String>,
    pub mime: Option<String>,
    pub data: Vec<u8>,
}

impl Part {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            mime: None,
            data: value.into().into_bytes(),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            mime: Some(mime.into()),
            data,
        }
    }
}

/// Request payload. Kept as plain data so a request can be sent twice.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Binary(Vec<u8>),
    Multipart(Vec<Part>),
}

impl RequestBody {
    /// Opaque bodies carry their own content type (or boundary) from the transport.
    pub fn is_opaque(&self) -> bool {
        matches!(self, RequestBody::Binary(_) | RequestBody::Multipart(_))
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }

    /// Turn a non-success response into the matching `ApiError`.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.text()))
        }
    }
}

/// One HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `Err` means no response was received at all; any status is `Ok`.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Headers from `config.default_headers`, sent with every request.
pub fn default_headers(config: &Config) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.default_headers {
        let (name, value) = header_pair(name, value)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Parse a caller-supplied header.
pub(crate) fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ApiError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ApiError::InvalidRequest(format!("Bad header name '{}': {}", name, e)))?;
    let value = HeaderValue::from_str(value).map_err(|e| {
        ApiError::InvalidRequest(format!("Bad value for header '{}': {}", name, e))
    })?;
    Ok((name, value))
}

/// `reqwest`-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }

    fn form(parts: Vec<Part>) -> Result<Form, ApiError> {
        let mut form = Form::new();
        for part in parts {
            let mut field = FormPart::bytes(part.data);
            if let Some(file_name) = part.file_name {
                field = field.file_name(file_name);
            }
            if let Some(mime) = part.mime {
                field = field.mime_str(&mime).map_err(|e| {
                    ApiError::InvalidRequest(format!("Bad mime type '{}': {}", mime, e))
                })?;
            }
            form = form.part(part.name, field);
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Binary(data)) => builder.body(data),
            Some(RequestBody::Multipart(parts)) => builder.multipart(Self::form(parts)?),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
