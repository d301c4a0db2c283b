mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::models::*;

/// SQLite-backed store for pipeline log records.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "adea")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("adea.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Log operations
    // ============================================================

    pub fn insert_log(&self, input: CreateLogInput) -> Result<LogEntry> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let timestamp = input.timestamp.unwrap_or_else(Utc::now);

        conn.execute(
            "INSERT INTO pipeline_logs (id, timestamp, level, message, pipeline)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                format_timestamp(&timestamp),
                input.level.as_str(),
                &input.message,
                &input.pipeline,
            ),
        )?;

        Ok(LogEntry {
            id,
            timestamp,
            level: input.level,
            message: input.message,
            pipeline: input.pipeline,
        })
    }

    /// Most recent logs first, narrowed by the optional pipeline and level filters.
    pub fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref pipeline) = query.pipeline {
            conditions.push("pipeline = ?");
            params.push(Box::new(pipeline.clone()));
        }
        if let Some(level) = query.level {
            conditions.push("level = ?");
            params.push(Box::new(level.as_str()));
        }
        params.push(Box::new(query.limit));

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT id, timestamp, level, message, pipeline
             FROM pipeline_logs {} ORDER BY timestamp DESC LIMIT ?",
            where_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let logs = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(LogEntry {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    timestamp: parse_datetime(row.get::<_, String>(1)?),
                    level: LogLevel::from_str(&row.get::<_, String>(2)?).unwrap_or(LogLevel::Info),
                    message: row.get(3)?,
                    pipeline: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    pub fn count_logs_by_level(&self, level: LogLevel) -> Result<u64> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pipeline_logs WHERE level = ?",
            [level.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Insert a handful of representative ETL logs, for demos and first runs.
    pub fn insert_sample_logs(&self) -> Result<Vec<LogEntry>> {
        let samples = [
            (LogLevel::Error, "Airflow DAG failed due to missing dependencies", "ETL_Job_1"),
            (LogLevel::Info, "Pipeline executed successfully in 120 seconds", "ETL_Job_2"),
            (LogLevel::Warning, "Data quality check: 5% of records have missing values", "ETL_Job_1"),
            (LogLevel::Error, "Connection timeout while accessing data source", "ETL_Job_3"),
            (LogLevel::Info, "Processed 1.2 million records successfully", "ETL_Job_2"),
        ];

        let inserted = samples
            .into_iter()
            .map(|(level, message, pipeline)| {
                self.insert_log(CreateLogInput::new(level, message, Some(pipeline)))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Inserted {} sample logs", inserted.len());
        Ok(inserted)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

// Fixed-width UTC timestamps so lexical ORDER BY matches chronological order.
fn format_timestamp(ts: &chrono::DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
