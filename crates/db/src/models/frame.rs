use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// One saved revision of a project's generated page.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Frame {
    pub id: Uuid,
    pub project_id: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl Frame {
    pub async fn create<'e, E>(executor: E, project_id: Uuid, code: &str) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Frame>(
            r#"INSERT INTO frames (id, project_id, code)
               VALUES ($1, $2, $3)
               RETURNING id, project_id, code, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(code)
        .fetch_one(executor)
        .await
    }

    /// The most recently saved frame, which is the project's current page.
    pub async fn find_latest(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Frame>(
            r#"SELECT id, project_id, code, created_at
               FROM frames
               WHERE project_id = $1
               ORDER BY created_at DESC, rowid DESC
               LIMIT 1"#,
        )
        .bind(project_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn count_for_project(pool: &SqlitePool, project_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM frames WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(pool)
            .await
    }
}
