use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::frame::Frame;

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateProject {
    pub name: Option<String>,
    pub code: String,
}

/// A project together with the markup of its latest frame.
#[derive(Debug, Clone, Serialize, TS)]
pub struct ProjectWithCode {
    #[serde(flatten)]
    pub project: Project,
    pub code: String,
}

impl Project {
    /// Creates the project and its first frame in one transaction.
    pub async fn create_with_frame(
        pool: &SqlitePool,
        created_by: &str,
        data: &CreateProject,
    ) -> Result<(Self, Frame), sqlx::Error> {
        let name = data
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PROJECT_NAME);

        let mut tx = pool.begin().await?;
        let project = sqlx::query_as::<_, Project>(
            r#"INSERT INTO projects (id, name, created_by)
               VALUES ($1, $2, $3)
               RETURNING id, name, created_by, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;
        let frame = Frame::create(&mut *tx, project.id, &data.code).await?;
        tx.commit().await?;

        Ok((project, frame))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            "SELECT id, name, created_by, created_at FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Looks a project up only if `owner` created it.
    pub async fn find_for_owner(
        pool: &SqlitePool,
        id: Uuid,
        owner: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"SELECT id, name, created_by, created_at
               FROM projects
               WHERE id = $1 AND created_by = $2"#,
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(pool)
        .await
    }

    /// Newest first.
    pub async fn find_by_owner(pool: &SqlitePool, owner: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"SELECT id, name, created_by, created_at
               FROM projects
               WHERE created_by = $1
               ORDER BY created_at DESC, rowid DESC"#,
        )
        .bind(owner)
        .fetch_all(pool)
        .await
    }
}
