//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::api::transport::{HttpRequest, HttpResponse, StatusCode, Transport};
use crate::api::ApiError;
use crate::auth::token::mint;
use crate::auth::{Credential, CredentialStore, ManualClock, MemoryCredentialStore, Session};
use crate::config::{Config, StorageBackend};
use crate::models::{Profile, Role};

pub const BASE_URL: &str = "http://shop.test";
pub const REFRESH: &str = "/api/auth/refresh";
pub const LOGIN: &str = "/api/auth/login";
pub const LOGOUT: &str = "/api/auth/logout";

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    NoResponse,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Reply::Status(200, body.into())
    }

    pub fn status(code: u16) -> Self {
        Reply::Status(code, String::new())
    }
}

/// Transport answering from per-path reply queues. The last reply of a queue
/// repeats; unknown paths get 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, path: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| path_of(&r.url) == path)
            .cloned()
            .collect()
    }

    pub fn calls(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let path = path_of(&request.url).to_string();
        self.requests.lock().unwrap().push(request);

        // Suspend like a real network call so concurrent callers interleave.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&path) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Status(code, body)) => Ok(HttpResponse::new(
                StatusCode::from_u16(code).unwrap(),
                body.into_bytes(),
            )),
            Some(Reply::NoResponse) => Err(ApiError::NetworkError("connection refused".into())),
            None => Ok(HttpResponse::new(StatusCode::NOT_FOUND, Vec::new())),
        }
    }
}

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).unwrap()
}

/// Access token issued at `now` that expires after `minutes`.
pub fn token(name: &str, now: DateTime<Utc>, minutes: i64) -> String {
    mint(&format!("{}@shop.vn", name), now, now + Duration::minutes(minutes))
}

pub fn profile() -> Profile {
    Profile::new("an@shop.vn", [Role::Customer])
}

pub fn credential(access: &str, refresh: &str) -> Credential {
    Credential {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        user: profile(),
    }
}

/// JSON body of a successful `/login` or `/refresh`.
pub fn auth_body(access: &str, refresh: &str) -> String {
    serde_json::json!({
        "accessToken": access,
        "refreshToken": refresh,
        "tokenType": "Bearer",
        "user": profile(),
    })
    .to_string()
}

pub fn config() -> Config {
    Config {
        base_url: BASE_URL.to_string(),
        storage: StorageBackend::Memory,
        ..Config::default()
    }
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub store: Arc<MemoryCredentialStore>,
    pub clock: Arc<ManualClock>,
    pub session: Session,
}

impl Harness {
    pub fn new(credential: Option<Credential>) -> Self {
        Self::with_config(config(), credential)
    }

    pub fn with_config(config: Config, credential: Option<Credential>) -> Self {
        let transport = FakeTransport::new();
        let store = Arc::new(match credential {
            Some(c) => MemoryCredentialStore::with_credential(c),
            None => MemoryCredentialStore::new(),
        });
        let clock = Arc::new(ManualClock::new(t0()));
        let session = Session::new(
            config,
            transport.clone(),
            store.clone() as Arc<dyn CredentialStore>,
            clock.clone(),
        );
        Self {
            transport,
            store,
            clock,
            session,
        }
    }

    pub fn stored(&self) -> Option<Credential> {
        self.store.get().unwrap()
    }
}
