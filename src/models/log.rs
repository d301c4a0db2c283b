use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a pipeline log record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [Self::Info, Self::Warning, Self::Error, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Ordinal used as the severity feature by the anomaly detector.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Error => 2,
            Self::Critical => 3,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log record emitted by a data pipeline (or by ADEA itself).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Name of the pipeline that produced the record, if known.
    pub pipeline: Option<String>,
}

/// Input for inserting a log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLogInput {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub pipeline: Option<String>,
    /// Defaults to the time of insertion.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl CreateLogInput {
    pub fn new(level: LogLevel, message: impl Into<String>, pipeline: Option<&str>) -> Self {
        Self {
            level,
            message: message.into(),
            pipeline: pipeline.map(str::to_string),
            timestamp: None,
        }
    }
}

/// Filters for fetching log records. Filters combine with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogQuery {
    pub limit: u32,
    pub pipeline: Option<String>,
    pub level: Option<LogLevel>,
}

impl LogQuery {
    pub fn recent(limit: u32) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}
