use serde::{de, Deserialize, Deserializer, Serialize};

use super::{LogEntry, LogLevel};

/// Body of `POST /chat`, accepted either as JSON or as form data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatInput {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub cached: bool,
}

/// Query string shared by `/logs` and `/anomalies`. Blank values mean "no filter".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilterParams {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub pipeline: Option<String>,
    #[serde(default, deserialize_with = "level_filter")]
    pub level: Option<LogLevel>,
    pub limit: Option<u32>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.trim().is_empty()))
}

fn level_filter<'de, D>(deserializer: D) -> Result<Option<LogLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    blank_as_none(deserializer)?
        .map(|s| {
            LogLevel::from_str(&s).ok_or_else(|| {
                de::Error::custom(format!(
                    "unknown level `{}`, expected INFO, WARNING, ERROR or CRITICAL",
                    s
                ))
            })
        })
        .transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub total_logs: usize,
    pub anomalies_detected: usize,
    pub execution_time_seconds: f64,
    pub anomalies: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

/// Service description returned by `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiInfo {
    pub name: String,
    pub version: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub path: String,
    pub methods: Vec<String>,
    pub description: String,
}
