use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: "001",
    name: "initial",
    sql: include_str!("migrations/001_initial.sql"),
}];

/// Bring the schema up to date. Each pending migration runs in its own
/// transaction together with its `schema_migrations` row.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    for migration in MIGRATIONS.iter() {
        if is_applied(conn, migration.version)? {
            continue;
        }

        tracing::info!(version = migration.version, name = migration.name, "Applying migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .with_context(|| format!("Migration {} ({}) failed", migration.version, migration.name))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
            (
                migration.version,
                migration.name,
                chrono::Utc::now().to_rfc3339(),
            ),
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn is_applied(conn: &Connection, version: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM schema_migrations WHERE version = ?",
            [version],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn fresh_database_gets_log_table() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='pipeline_logs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(versions(&conn), vec!["001"]);
    }

    #[test]
    fn rerunning_applies_nothing_twice() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(versions(&conn), vec!["001"]);
        assert!(is_applied(&conn, "001").unwrap());
        assert!(!is_applied(&conn, "002").unwrap());
    }
}
