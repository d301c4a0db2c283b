//! Authentication and rate limiting.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use uuid::Uuid;

use super::ApiError;
use crate::config::AuthConfig;

/// Credentials and limits guarding the protected routes.
///
/// Authentication is enabled as soon as a login password or an API key is set.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub username: String,
    pub password: Option<String>,
    /// Static bearer key accepted on protected routes.
    pub api_key: Option<String>,
    pub tokens: TokenStore,
    pub rate_limiter: Option<RateLimiter>,
}

impl SecurityConfig {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            api_key: config.api_key.clone(),
            tokens: TokenStore::new(Duration::from_secs(config.token_ttl_secs)),
            rate_limiter: config
                .rate_limit_per_minute
                .map(|max| RateLimiter::new(max, Duration::from_secs(60))),
        }
    }

    /// No authentication, no rate limiting (local development and tests).
    pub fn disabled() -> Self {
        Self::from_config(&AuthConfig::default())
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::disabled()
        }
    }

    pub fn with_login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            ..Self::disabled()
        }
    }

    pub fn with_rate_limit(max_requests: u32) -> Self {
        Self {
            rate_limiter: Some(RateLimiter::new(max_requests, Duration::from_secs(60))),
            ..Self::disabled()
        }
    }

    pub fn auth_enabled(&self) -> bool {
        self.password.is_some() || self.api_key.is_some()
    }

    /// Issue a token when the credentials match.
    pub fn login(&self, username: &str, password: &str) -> Option<String> {
        let expected = self.password.as_deref()?;
        let user_ok = secrets_match(username, &self.username);
        if secrets_match(password, expected) && user_ok {
            Some(self.tokens.issue(username))
        } else {
            None
        }
    }

    /// The identity behind a bearer token, if it is valid.
    pub fn authenticate(&self, token: &str) -> Option<String> {
        if let Some(key) = self.api_key.as_deref() {
            if secrets_match(token, key) {
                return Some("api-key".to_string());
            }
        }
        self.tokens.validate(token)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Login tokens with a fixed lifetime, kept in memory.
#[derive(Clone, Debug)]
pub struct TokenStore {
    ttl: Duration,
    tokens: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl TokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn issue(&self, subject: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Instant::now() + self.ttl;
        self.tokens
            .lock()
            .unwrap()
            .insert(token.clone(), (subject.to_string(), expires_at));
        token
    }

    pub fn validate(&self, token: &str) -> Option<String> {
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get(token) {
            Some((subject, expires_at)) if *expires_at > Instant::now() => Some(subject.clone()),
            Some(_) => {
                tokens.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        self.tokens
            .lock()
            .unwrap()
            .retain(|_, (_, expires_at)| *expires_at > now);
    }
}

/// Per-client request budget over a sliding window, kept in memory.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a request from `ip`. `false` once its budget for the window is spent.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap();
        let hits = clients.entry(ip).or_default();
        self.forget_before(hits, now);

        if hits.len() >= self.max_requests as usize {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Drop clients with no request inside the window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.clients.lock().unwrap().retain(|_, hits| {
            self.forget_before(hits, now);
            !hits.is_empty()
        });
    }

    fn forget_before(&self, hits: &mut VecDeque<Instant>, now: Instant) {
        while hits
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            hits.pop_front();
        }
    }
}

/// Token from an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Rejects requests without a valid bearer token while authentication is enabled.
pub async fn auth_middleware(
    State(config): State<SecurityConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if !config.auth_enabled() {
        return Ok(next.run(request).await);
    }

    match bearer_token(request.headers()) {
        Some(token) => {
            if config.authenticate(token).is_some() {
                Ok(next.run(request).await)
            } else {
                tracing::warn!("Invalid or expired token provided");
                Err(ApiError::Unauthorized("Invalid or expired token".to_string()))
            }
        }
        None => {
            tracing::warn!("Missing Authorization header");
            Err(ApiError::Unauthorized(
                "Missing Authorization header".to_string(),
            ))
        }
    }
}

pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(&request).unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    if rate_limiter.check(ip) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Rate limit exceeded for IP: {}", ip);
        Err(ApiError::RateLimited)
    }
}

/// The caller's address: first hop of `X-Forwarded-For`, then `X-Real-IP`,
/// then the peer address of the connection.
pub fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header("X-Forwarded-For")
        .or_else(|| header("X-Real-IP"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

/// Equality on digests, so the comparison time does not depend on where
/// the inputs first differ.
fn secrets_match(given: &str, expected: &str) -> bool {
    let given = md5::compute(given.as_bytes());
    let expected = md5::compute(expected.as_bytes());
    given
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
