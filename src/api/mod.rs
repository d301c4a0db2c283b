mod error;
mod handlers;
pub mod middleware;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::anomaly::AnomalyDetector;
use crate::cache::ResponseCache;
use crate::chat::{Assistant, OpenAiAssistant};
use crate::config::{AnomalyConfig, Config};
use crate::db::Database;
use crate::metrics::{self, Metrics};
use crate::slack::{SlackBot, SlackClient};

pub use error::ApiError;
pub use middleware::{client_ip, SecurityConfig};

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub cache: ResponseCache,
    pub assistant: Arc<dyn Assistant>,
    pub detector: Arc<AnomalyDetector>,
    pub metrics: Metrics,
    pub security: SecurityConfig,
    pub slack: Option<Arc<SlackBot>>,
}

impl AppState {
    /// Defaults: one-hour cache, default detector, no auth, no Slack.
    pub fn new(db: Database, assistant: Arc<dyn Assistant>) -> Result<Self> {
        let detector = AnomalyDetector::new(db.clone(), &AnomalyConfig::default());
        Ok(Self {
            db,
            cache: ResponseCache::new(std::time::Duration::from_secs(3600)),
            assistant,
            detector: Arc::new(detector),
            metrics: Metrics::new()?,
            security: SecurityConfig::disabled(),
            slack: None,
        })
    }

    pub fn from_config(config: &Config, db: Database) -> Result<Self> {
        let assistant: Arc<dyn Assistant> = Arc::new(OpenAiAssistant::new(&config.openai));
        let cache = if config.cache.enabled {
            ResponseCache::new(config.cache_ttl())
        } else {
            ResponseCache::disabled()
        };
        let slack = config.slack.token.as_ref().map(|token| {
            Arc::new(SlackBot::new(SlackClient::new(
                config.slack.base_url.clone(),
                token.clone(),
            )))
        });

        Ok(Self {
            detector: Arc::new(AnomalyDetector::new(db.clone(), &config.anomaly)),
            cache,
            security: SecurityConfig::from_config(&config.auth),
            slack,
            ..Self::new(db, assistant)?
        })
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_slack(mut self, bot: SlackBot) -> Self {
        self.slack = Some(Arc::new(bot));
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/logs", get(handlers::get_logs))
        .route("/anomalies", get(handlers::anomalies))
        .route("/retrain", post(handlers::retrain))
        .route_layer(from_fn_with_state(
            state.security.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/login", post(handlers::login))
        .route("/chat", post(handlers::chat))
        .route("/metrics", get(handlers::metrics))
        .merge(protected);

    if state.slack.is_some() {
        app = app.route("/slack/events", post(handlers::slack_events));
    }

    // Rejections from the rate limiter are still counted and audited.
    if let Some(limiter) = state.security.rate_limiter.clone() {
        app = app.layer(from_fn_with_state(limiter, middleware::rate_limit_middleware));
    }

    let app = app
        .layer(from_fn_with_state(
            state.metrics.clone(),
            metrics::track_requests,
        ))
        .layer(from_fn(crate::compliance::audit_requests));

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
