//! Database access for rubric-ae
//!
//! SQLite storage for assignments and evaluation results.

pub mod repository;

pub use repository::{AssessmentRepository, SqliteRepository};

use rubric_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the parent directory and the database file when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the assignments and evaluations tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            config TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluations (
            id TEXT PRIMARY KEY,
            submission_id TEXT NOT NULL,
            assignment_id TEXT NOT NULL,
            student_key TEXT NOT NULL,
            evaluated_by TEXT NOT NULL,
            evaluated_at TEXT NOT NULL,
            result TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evaluations_student ON evaluations (student_key, evaluated_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evaluations_assignment ON evaluations (assignment_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (assignments, evaluations)");

    Ok(())
}
