use std::time::Instant;

use axum::{
    extract::{rejection::QueryRejection, FromRequest, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde_json::{json, Value};

use super::middleware::bearer_token;
use super::{ApiError, AppState};
use crate::cache::cache_key;
use crate::chat::reply_or_fallback;
use crate::compliance::redact_message;
use crate::models::*;
use crate::slack::{self, EventEnvelope};

pub const CHATBOT_PIPELINE: &str = "CHATBOT";
pub const CHATBOT_CACHED_PIPELINE: &str = "CHATBOT_CACHED";
pub const ANOMALY_PIPELINE: &str = "ANOMALY_DETECTOR";

const DEFAULT_LOGS_LIMIT: u32 = 10;
const DEFAULT_ANOMALIES_LIMIT: u32 = 100;
const PREVIEW_CHARS: usize = 50;

// ============================================================
// Error Handling
// ============================================================

/// Count the failure against `endpoint` and wrap it for the client.
fn server_error(state: &AppState, endpoint: &str, e: anyhow::Error) -> ApiError {
    state.metrics.record_error(endpoint, "server_error");
    ApiError::Internal(e)
}

fn query_params(
    query: Result<Query<LogFilterParams>, QueryRejection>,
) -> Result<LogFilterParams, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

// ============================================================
// Info
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn index() -> Json<ApiInfo> {
    let endpoint = |path: &str, method: &str, description: &str| EndpointInfo {
        path: path.to_string(),
        methods: vec![method.to_string()],
        description: description.to_string(),
    };

    Json(ApiInfo {
        name: "AI-Powered Automated Data Engineering Assistant API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            endpoint("/", "GET", "API information"),
            endpoint("/login", "POST", "Get an access token"),
            endpoint("/chat", "POST", "Chat with the AI assistant"),
            endpoint("/anomalies", "GET", "Detect anomalies in logs"),
            endpoint("/logs", "GET", "Get recent logs"),
            endpoint("/retrain", "POST", "Retrain the anomaly detection model"),
            endpoint("/metrics", "GET", "Get Prometheus metrics"),
        ],
    })
}

// ============================================================
// Auth
// ============================================================

pub async fn login(State(state): State<AppState>, Json(input): Json<LoginInput>) -> Response {
    let username = input.username.unwrap_or_default();
    let password = input.password.unwrap_or_default();

    match state.security.login(&username, &password) {
        Some(access_token) => {
            tracing::info!("Issued access token for {}", username);
            Json(LoginResponse { access_token }).into_response()
        }
        None => {
            tracing::warn!("Failed login attempt for {}", username);
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "msg": "Invalid credentials" })),
            )
                .into_response()
        }
    }
}

// ============================================================
// Chat
// ============================================================

impl<S> FromRequest<S> for ChatInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    /// JSON bodies and form posts are both accepted; anything unreadable
    /// becomes an empty message.
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let input = if is_json {
            Json::<ChatInput>::from_request(req, state)
                .await
                .ok()
                .map(|Json(input)| input)
        } else {
            Form::<ChatInput>::from_request(req, state)
                .await
                .ok()
                .map(|Form(input)| input)
        };

        Ok(input.unwrap_or_default())
    }
}

/// `/chat` is open to everyone; a bearer token is only checked and logged.
fn log_chat_caller(state: &AppState, headers: &HeaderMap) {
    match bearer_token(headers) {
        None => tracing::warn!("Unauthenticated chat request"),
        Some(token) => match state.security.authenticate(token) {
            Some(user) => tracing::info!("Chat request from {}", user),
            None => tracing::warn!("Invalid token on chat request"),
        },
    }
}

fn preview(message: &str) -> String {
    redact_message(&message.chars().take(PREVIEW_CHARS).collect::<String>())
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    input: ChatInput,
) -> Result<Json<ChatReply>, ApiError> {
    log_chat_caller(&state, &headers);

    let message = input.message;
    if message.is_empty() {
        state.metrics.record_error("/chat", "missing_message");
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }

    let key = cache_key(&message);
    if let Some(cached) = state.cache.get(&key) {
        state.metrics.record_cache_hit();
        state
            .db
            .insert_log(CreateLogInput::new(
                LogLevel::Info,
                format!("Cached response for: {}...", preview(&message)),
                Some(CHATBOT_CACHED_PIPELINE),
            ))
            .map_err(|e| server_error(&state, "/chat", e))?;

        return Ok(Json(ChatReply {
            response: cached,
            cached: true,
        }));
    }
    state.metrics.record_cache_miss();

    let (response, answered) = reply_or_fallback(state.assistant.as_ref(), &message).await;
    if answered {
        state.cache.insert(key, response.clone());
    }

    state
        .db
        .insert_log(CreateLogInput::new(
            LogLevel::Info,
            format!(
                "User query: {}... | Response length: {}",
                preview(&message),
                response.chars().count()
            ),
            Some(CHATBOT_PIPELINE),
        ))
        .map_err(|e| server_error(&state, "/chat", e))?;

    Ok(Json(ChatReply {
        response,
        cached: false,
    }))
}

// ============================================================
// Logs & Anomalies
// ============================================================

pub async fn get_logs(
    State(state): State<AppState>,
    query: Result<Query<LogFilterParams>, QueryRejection>,
) -> Result<Json<LogsResponse>, ApiError> {
    let params = query_params(query)?;
    let logs = state
        .db
        .fetch_logs(&LogQuery {
            limit: params.limit.unwrap_or(DEFAULT_LOGS_LIMIT),
            pipeline: params.pipeline,
            level: params.level,
        })
        .map_err(|e| server_error(&state, "/logs", e))?;

    Ok(Json(LogsResponse { logs }))
}

pub async fn anomalies(
    State(state): State<AppState>,
    query: Result<Query<LogFilterParams>, QueryRejection>,
) -> Result<Json<AnomalyReport>, ApiError> {
    let params = query_params(query)?;
    let logs = state
        .db
        .fetch_logs(&LogQuery {
            limit: params.limit.unwrap_or(DEFAULT_ANOMALIES_LIMIT),
            pipeline: params.pipeline,
            level: params.level,
        })
        .map_err(|e| server_error(&state, "/anomalies", e))?;
    let total_logs = logs.len();

    let start = Instant::now();
    let anomalies = state
        .detector
        .detect_anomalies(Some(logs))
        .map_err(|e| server_error(&state, "/anomalies", e))?;
    let execution_time_seconds = start.elapsed().as_secs_f64();

    state.metrics.record_anomalies(anomalies.len());

    state
        .db
        .insert_log(CreateLogInput::new(
            LogLevel::Info,
            format!(
                "Anomaly detection completed in {:.2}s. Found {} anomalies.",
                execution_time_seconds,
                anomalies.len()
            ),
            Some(ANOMALY_PIPELINE),
        ))
        .map_err(|e| server_error(&state, "/anomalies", e))?;

    Ok(Json(AnomalyReport {
        total_logs,
        anomalies_detected: anomalies.len(),
        execution_time_seconds,
        anomalies,
    }))
}

pub async fn retrain(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RetrainResponse>), ApiError> {
    let start = Instant::now();
    let trained = state
        .detector
        .train_model()
        .map_err(|e| server_error(&state, "/retrain", e))?;
    state.metrics.record_train_time(start.elapsed().as_secs_f64());

    if trained {
        Ok((
            StatusCode::OK,
            Json(RetrainResponse {
                status: "success".to_string(),
                message: "Model retrained successfully".to_string(),
            }),
        ))
    } else {
        state.metrics.record_error("/retrain", "training_failure");
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RetrainResponse {
                status: "error".to_string(),
                message: "Failed to retrain model".to_string(),
            }),
        ))
    }
}

// ============================================================
// Metrics
// ============================================================

pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    for level in LogLevel::ALL {
        let count = state
            .db
            .count_logs_by_level(level)
            .map_err(|e| server_error(&state, "/metrics", e))?;
        state.metrics.set_log_count(level, count);
    }

    let body = state
        .metrics
        .render()
        .map_err(|e| server_error(&state, "/metrics", e.into()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

// ============================================================
// Slack
// ============================================================

pub async fn slack_events(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> Json<Value> {
    if let Some(challenge) = envelope.challenge {
        return Json(json!({ "challenge": challenge }));
    }

    let (Some(bot), Some(event)) = (state.slack.clone(), envelope.event) else {
        return Json(json!({ "status": "ok" }));
    };

    let mention = match bot.mention(&event).await {
        Ok(Some(mention)) => mention,
        Ok(None) => return Json(json!({ "status": "ok" })),
        Err(e) => {
            tracing::error!("Could not resolve Slack bot identity: {}", e);
            return Json(json!({ "status": "ok" }));
        }
    };

    if let Err(e) = state.db.insert_log(slack::received_log(&mention)) {
        tracing::warn!("Failed to record Slack message: {:#}", e);
    }

    let assistant = state.assistant.clone();
    let db = state.db.clone();
    tokio::spawn(async move { bot.respond(assistant, db, mention).await });

    Json(json!({ "status": "ok" }))
}
