//! Schema setup for the SQLite store.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the database at `db_path` and apply the schema.
///
/// Every pooled connection runs in WAL mode with foreign keys enforced.
///
/// # Errors
/// Returns an error if the parent directory cannot be created, the file
/// cannot be opened, or a schema statement fails.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database ready at {}", db_path);
    Ok(pool)
}

/// Apply `schema.sql`. Statements are idempotent, so this runs on every start.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements: Vec<&str> = include_str!("schema.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }

    debug!("Applied {} schema statements", statements.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_db() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_init_db_creates_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("nested")
            .join("test.db")
            .to_string_lossy()
            .to_string();

        let pool = init_db(&db_path).await.expect("init_db failed");
        assert!(Path::new(&db_path).exists());

        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let (pool, _temp) = fresh_db().await;

        for table in [
            "custom_pools",
            "position_history",
            "fee_withdrawals",
            "timeframe_adjustments",
            "distribution_runs",
            "leads",
            "billing_profiles",
        ] {
            let result: (String,) =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .unwrap_or_else(|_| panic!("missing table {}", table));
            assert_eq!(result.0, table);
        }
    }

    #[tokio::test]
    async fn test_migrations_seed_adjustments_once() {
        let (pool, _temp) = fresh_db().await;

        sqlx::query(
            "UPDATE timeframe_adjustments SET adjustment_percentage = '1' WHERE timeframe = 30",
        )
        .execute(&pool)
        .await
        .unwrap();

        run_migrations(&pool)
            .await
            .expect("second migration run failed");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM timeframe_adjustments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 3);

        let pct: (String,) = sqlx::query_as(
            "SELECT adjustment_percentage FROM timeframe_adjustments WHERE timeframe = 30",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(pct.0, "1", "re-running migrations must not reset edits");
    }

    #[tokio::test]
    async fn test_pragmas_configured() {
        let (pool, _temp) = fresh_db().await;

        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);

        let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(mode.0.to_lowercase(), "wal");
    }
}
