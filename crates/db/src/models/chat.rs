use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "chat_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
    User,
    Ai,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Chat {
    pub id: Uuid,
    pub project_id: Uuid,
    pub role: ChatRole,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateChat {
    pub role: ChatRole,
    pub message: String,
}

impl Chat {
    pub async fn create<'e, E>(
        executor: E,
        project_id: Uuid,
        data: &CreateChat,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Chat>(
            r#"INSERT INTO chats (id, project_id, role, message)
               VALUES ($1, $2, $3, $4)
               RETURNING id, project_id, role, message, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(data.role)
        .bind(&data.message)
        .fetch_one(executor)
        .await
    }

    /// Conversation history, oldest first.
    pub async fn find_by_project(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Chat>(
            r#"SELECT id, project_id, role, message, created_at
               FROM chats
               WHERE project_id = $1
               ORDER BY created_at ASC, rowid ASC"#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }
}
