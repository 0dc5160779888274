//! Assessment persistence
//!
//! Results and assignment configs are stored as JSON documents next to the
//! columns used for lookup and ordering.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use rubric_common::{AssessmentResult, Assignment, AssignmentConfig, Error, Result};

/// Storage collaborator for the assessment service
#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    /// Store a new result; results are never updated
    async fn persist_result(&self, result: &AssessmentResult) -> Result<Uuid>;

    /// Every result for a student, oldest first
    async fn load_history(&self, student_key: &str) -> Result<Vec<AssessmentResult>>;

    /// # Errors
    /// [`Error::NotFound`] for an unknown assignment.
    async fn load_assignment_config(&self, assignment_id: &str) -> Result<AssignmentConfig>;

    async fn load_assignment(&self, assignment_id: &str) -> Result<Option<Assignment>>;

    /// Every result for an assignment, oldest first
    async fn load_assignment_results(&self, assignment_id: &str) -> Result<Vec<AssessmentResult>>;

    /// Create or replace an assignment
    ///
    /// # Errors
    /// [`Error::Conflict`] when the assignment already has results, since
    /// those results were judged against the stored config.
    async fn save_assignment(&self, assignment: &Assignment) -> Result<()>;
}

/// SQLite-backed [`AssessmentRepository`]
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn results_where(&self, column: &str, value: &str) -> Result<Vec<AssessmentResult>> {
        let sql = format!(
            "SELECT result FROM evaluations WHERE {} = ? ORDER BY evaluated_at ASC, rowid ASC",
            column
        );
        let rows = sqlx::query(&sql).bind(value).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let json: String = row.get("result");
                serde_json::from_str(&json)
                    .map_err(|e| Error::Internal(format!("Failed to deserialize result: {}", e)))
            })
            .collect()
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    // Fixed precision keeps lexical order equal to time order
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl AssessmentRepository for SqliteRepository {
    async fn persist_result(&self, result: &AssessmentResult) -> Result<Uuid> {
        let json = serde_json::to_string(result)
            .map_err(|e| Error::Internal(format!("Failed to serialize result: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO evaluations (
                id, submission_id, assignment_id, student_key,
                evaluated_by, evaluated_at, result
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.id.to_string())
        .bind(&result.submission_id)
        .bind(&result.assignment_id)
        .bind(&result.student_key)
        .bind(&result.evaluated_by)
        .bind(timestamp(&result.evaluated_at))
        .bind(&json)
        .execute(&self.pool)
        .await?;

        tracing::debug!(evaluation = %result.id, student = %result.student_key, "Result persisted");
        Ok(result.id)
    }

    async fn load_history(&self, student_key: &str) -> Result<Vec<AssessmentResult>> {
        self.results_where("student_key", student_key).await
    }

    async fn load_assignment_config(&self, assignment_id: &str) -> Result<AssignmentConfig> {
        self.load_assignment(assignment_id)
            .await?
            .map(|assignment| assignment.config)
            .ok_or_else(|| Error::NotFound(format!("assignment {}", assignment_id)))
    }

    async fn load_assignment(&self, assignment_id: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query("SELECT id, title, config, created_at FROM assignments WHERE id = ?")
            .bind(assignment_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let config: String = row.get("config");
        let config: AssignmentConfig = serde_json::from_str(&config)
            .map_err(|e| Error::Internal(format!("Failed to deserialize config: {}", e)))?;

        let created_at: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(Some(Assignment {
            id: row.get("id"),
            title: row.get("title"),
            config,
            created_at,
        }))
    }

    async fn load_assignment_results(&self, assignment_id: &str) -> Result<Vec<AssessmentResult>> {
        self.results_where("assignment_id", assignment_id).await
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        let config = serde_json::to_string(&assignment.config)
            .map_err(|e| Error::Internal(format!("Failed to serialize config: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        let results: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evaluations WHERE assignment_id = ?")
            .bind(&assignment.id)
            .fetch_one(&mut *tx)
            .await?;
        if results > 0 {
            return Err(Error::Conflict(format!(
                "assignment {} already has {} result(s) and cannot be changed",
                assignment.id, results
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO assignments (id, title, config, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                config = excluded.config
            "#,
        )
        .bind(&assignment.id)
        .bind(&assignment.title)
        .bind(&config)
        .bind(timestamp(&assignment.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
