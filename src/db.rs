use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 1] = [Migration {
    version: 1,
    name: "baseline_record_schema_v1",
    sql: r#"
CREATE TABLE IF NOT EXISTS records (
    refname TEXT PRIMARY KEY,
    value TEXT,
    description TEXT,
    dtype TEXT,
    status TEXT,
    owner TEXT,
    other TEXT,
    notes TEXT,
    commentary TEXT,
    id INTEGER
);

CREATE TABLE IF NOT EXISTS trace (
    refname TEXT NOT NULL,
    tracename TEXT NOT NULL,
    tracetype TEXT NOT NULL,
    comment TEXT
);

CREATE TABLE IF NOT EXISTS types (
    name TEXT PRIMARY KEY,
    description TEXT,
    start TEXT,
    duration_months INTEGER
);

CREATE TABLE IF NOT EXISTS updated (
    refname TEXT NOT NULL,
    updated TEXT NOT NULL,
    by TEXT,
    note TEXT,
    level INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_records_dtype ON records(dtype);
CREATE INDEX IF NOT EXISTS idx_trace_refname ON trace(refname);
CREATE INDEX IF NOT EXISTS idx_updated_refname ON updated(refname);
"#,
}];

pub fn open_connection(path: &str) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_speed(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_for_speed(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.commit()
}

fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}

#[cfg(test)]
mod tests;
