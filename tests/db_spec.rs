use adea::db::Database;
use adea::models::*;
use chrono::{TimeZone, Utc};
use speculate2::speculate;

fn log_at(db: &Database, level: LogLevel, pipeline: Option<&str>, minute: u32) -> LogEntry {
    db.insert_log(CreateLogInput {
        level,
        message: format!("event at minute {}", minute),
        pipeline: pipeline.map(str::to_string),
        timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 10, 8, minute, 0).unwrap()),
    })
    .expect("Failed to insert log")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "insert_log" {
        it "returns the stored entry" {
            let entry = db
                .insert_log(CreateLogInput::new(LogLevel::Warning, "slow stage", Some("ETL_Job_1")))
                .expect("Failed to insert");

            assert_eq!(entry.level, LogLevel::Warning);
            assert_eq!(entry.message, "slow stage");
            assert_eq!(entry.pipeline.as_deref(), Some("ETL_Job_1"));

            let stored = db.fetch_logs(&LogQuery::recent(10)).expect("Query failed");
            assert_eq!(stored.len(), 1);
            assert_eq!(stored[0].id, entry.id);
            assert_eq!(stored[0].level, LogLevel::Warning);
        }

        it "keeps an explicit timestamp" {
            let entry = log_at(&db, LogLevel::Info, None, 42);
            let stored = db.fetch_logs(&LogQuery::recent(1)).expect("Query failed");

            assert_eq!(stored[0].timestamp, entry.timestamp);
            assert!(stored[0].pipeline.is_none());
        }
    }

    describe "fetch_logs" {
        before {
            log_at(&db, LogLevel::Info, Some("ETL_Job_1"), 1);
            log_at(&db, LogLevel::Error, Some("ETL_Job_1"), 2);
            log_at(&db, LogLevel::Error, Some("ETL_Job_2"), 3);
            log_at(&db, LogLevel::Critical, Some("ETL_Job_2"), 4);
        }

        it "returns the most recent first" {
            let logs = db.fetch_logs(&LogQuery::recent(10)).expect("Query failed");
            let minutes: Vec<String> = logs.iter().map(|l| l.timestamp.format("%M").to_string()).collect();
            assert_eq!(minutes, vec!["04", "03", "02", "01"]);
        }

        it "honours the limit" {
            let logs = db.fetch_logs(&LogQuery::recent(2)).expect("Query failed");
            assert_eq!(logs.len(), 2);
            assert_eq!(logs[0].level, LogLevel::Critical);
        }

        it "filters by pipeline" {
            let logs = db.fetch_logs(&LogQuery {
                limit: 10,
                pipeline: Some("ETL_Job_1".to_string()),
                level: None,
            }).expect("Query failed");

            assert_eq!(logs.len(), 2);
            assert!(logs.iter().all(|l| l.pipeline.as_deref() == Some("ETL_Job_1")));
        }

        it "filters by level" {
            let logs = db.fetch_logs(&LogQuery {
                limit: 10,
                pipeline: None,
                level: Some(LogLevel::Error),
            }).expect("Query failed");

            assert_eq!(logs.len(), 2);
        }

        it "combines filters" {
            let logs = db.fetch_logs(&LogQuery {
                limit: 10,
                pipeline: Some("ETL_Job_2".to_string()),
                level: Some(LogLevel::Error),
            }).expect("Query failed");

            assert_eq!(logs.len(), 1);
            assert_eq!(logs[0].message, "event at minute 3");
        }

        it "returns nothing for an unknown pipeline" {
            let logs = db.fetch_logs(&LogQuery {
                limit: 10,
                pipeline: Some("nope".to_string()),
                level: None,
            }).expect("Query failed");

            assert!(logs.is_empty());
        }
    }

    describe "count_logs_by_level" {
        it "counts each level separately" {
            log_at(&db, LogLevel::Error, None, 1);
            log_at(&db, LogLevel::Error, None, 2);
            log_at(&db, LogLevel::Info, None, 3);

            assert_eq!(db.count_logs_by_level(LogLevel::Error).unwrap(), 2);
            assert_eq!(db.count_logs_by_level(LogLevel::Info).unwrap(), 1);
            assert_eq!(db.count_logs_by_level(LogLevel::Critical).unwrap(), 0);
        }
    }

    describe "insert_sample_logs" {
        it "inserts the ETL samples" {
            let inserted = db.insert_sample_logs().expect("Failed to seed");

            assert_eq!(inserted.len(), 5);
            assert_eq!(db.count_logs_by_level(LogLevel::Error).unwrap(), 2);
            assert_eq!(db.count_logs_by_level(LogLevel::Warning).unwrap(), 1);
            assert_eq!(db.count_logs_by_level(LogLevel::Info).unwrap(), 2);
        }
    }

    describe "open" {
        it "creates missing parent directories" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("nested").join("adea.db");

            let db = Database::open(path.clone()).expect("Failed to open");
            db.migrate().expect("Failed to migrate");
            db.insert_log(CreateLogInput::new(LogLevel::Info, "persisted", None)).unwrap();

            let reopened = Database::open(path).expect("Failed to reopen");
            reopened.migrate().expect("Migrations should be idempotent");
            let logs = reopened.fetch_logs(&LogQuery::recent(10)).unwrap();
            assert_eq!(logs.len(), 1);
            assert_eq!(logs[0].message, "persisted");
        }
    }
}
