use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Ordered schema steps; entry `i` upgrades `user_version` from `i` to `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("schema_v1.sql", include_str!("schemas/schema_v1.sql")),
    // Counters become per-day; legacy totals land on today's local date.
    ("schema_v2.sql", include_str!("schemas/schema_v2.sql")),
];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Brings the database up to [`CURRENT_SCHEMA_VERSION`] in one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if found > CURRENT_SCHEMA_VERSION {
        bail!(
            "database schema v{found} is newer than this build understands (v{CURRENT_SCHEMA_VERSION})"
        );
    }
    let Ok(applied) = usize::try_from(found) else {
        bail!("database reports negative schema version {found}");
    };
    let pending = &MIGRATIONS[applied..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (name, sql) in pending {
        tx.execute_batch(sql)
            .with_context(|| format!("failed to execute {name}"))?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    info!("Database schema upgraded from v{found} to v{CURRENT_SCHEMA_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn test_fresh_database_reaches_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        assert!(table_exists(&conn, "samples"));
        assert!(table_exists(&conn, "daily_counters"));
        assert!(!table_exists(&conn, "counters"));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
    }

    #[test]
    fn test_legacy_counters_carried_into_daily_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("schemas/schema_v1.sql")).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        conn.execute(
            "INSERT INTO counters (name, value) VALUES ('slouch_frequency', 7)",
            [],
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        let (value, date): (i64, String) = conn
            .query_row(
                "SELECT value, date FROM daily_counters WHERE name = 'slouch_frequency'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(date.len(), 10);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)
            .unwrap();

        assert!(run_migrations(&mut conn).is_err());
    }
}
