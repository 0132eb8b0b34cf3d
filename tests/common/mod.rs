#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::{
    io::Cursor,
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tower::ServiceExt;

use wg_console_ws::{
    create_app_router,
    services::{BcryptCredentialVerifier, CidrCountryResolver, CountryResolver, ManualClock},
    state::AppState,
    store::MemoryStore,
};
use wg_shared::{AppError, Config};

pub const ADMIN_PASSWORD: &str = "correct horse battery";
pub const ADMIN_IP: &str = "127.0.0.1";
/// Resolves to CN through the test CIDR table
pub const CN_IP: &str = "203.0.113.7";

const CIDR_TABLE: &str = "# test ranges\n203.0.113.0/24,CN\n198.51.100.0/24,DE\n";

/// CIDR resolver that counts how often the gate asks for a country
pub struct CountingResolver {
    inner: CidrCountryResolver,
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn lookups(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CountryResolver for CountingResolver {
    fn resolve(&self, ip: IpAddr) -> Result<Option<String>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(ip)
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub resolver: Arc<CountingResolver>,
    pub state: Arc<AppState>,
}

pub fn spawn_app() -> TestApp {
    let mut config = Config::default();
    config.security.settings_cache_ttl_seconds = 0;
    config.auth.jwt_secret = Some("integration-test-secret".to_string());

    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::default());
    let resolver = Arc::new(CountingResolver {
        inner: CidrCountryResolver::from_reader(Cursor::new(CIDR_TABLE)).unwrap(),
        calls: AtomicUsize::new(0),
    });
    let hash = bcrypt::hash(ADMIN_PASSWORD, 4).unwrap();
    let credentials = BcryptCredentialVerifier::new("admin", Some(hash));

    let state = Arc::new(AppState::from_parts(
        config,
        Arc::new(store.clone()),
        clock.clone(),
        resolver.clone(),
        Arc::new(credentials),
    ));

    TestApp {
        router: create_app_router(state.clone()),
        store,
        clock,
        resolver,
        state,
    }
}

pub struct Call<'a> {
    method: Method,
    path: &'a str,
    ip: &'a str,
    bearer: Option<&'a str>,
    body: Option<Value>,
}

impl<'a> Call<'a> {
    pub fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            ip: ADMIN_IP,
            bearer: None,
            body: None,
        }
    }

    pub fn from_ip(mut self, ip: &'a str) -> Self {
        self.ip = ip;
        self
    }

    pub fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl TestApp {
    pub async fn send(&self, call: Call<'_>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(call.method).uri(call.path);
        if let Some(token) = call.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match call.body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let mut request = builder.body(body).unwrap();
        let peer: SocketAddr = format!("{}:40000", call.ip).parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn login(&self, ip: &str, password: &str) -> (StatusCode, Value) {
        self.send(
            Call::new(Method::POST, "/login")
                .from_ip(ip)
                .json(json!({ "username": "admin", "password": password })),
        )
        .await
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self.login(ADMIN_IP, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "admin login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn events_of_type(&self, token: &str, event_type: &str) -> Vec<Value> {
        let path = format!("/security/events?type={}", event_type);
        let (status, body) = self.send(Call::new(Method::GET, &path).bearer(token)).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().cloned().unwrap_or_default()
    }
}
