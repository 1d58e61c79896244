use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;

/// An authenticated identity together with its generation allowance.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct User {
    pub identity: String,
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub credits: i64,
    #[ts(type = "string | null")]
    pub last_reset_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateUser {
    pub identity: String,
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

impl User {
    pub async fn find_by_identity(
        pool: &SqlitePool,
        identity: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"SELECT identity, email, name, image_url, credits, last_reset_date, created_at
               FROM users
               WHERE identity = $1"#,
        )
        .bind(identity)
        .fetch_optional(pool)
        .await
    }

    /// Inserts the user with `allowance` credits stamped for `today`.
    /// Existing rows are left untouched; returns whether a row was created.
    pub async fn ensure(
        pool: &SqlitePool,
        data: &CreateUser,
        allowance: i64,
        today: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"INSERT INTO users (identity, email, name, image_url, credits, last_reset_date)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT(identity) DO NOTHING"#,
        )
        .bind(&data.identity)
        .bind(&data.email)
        .bind(&data.name)
        .bind(&data.image_url)
        .bind(allowance)
        .bind(today)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Restores the balance to `allowance` when the last reset happened on a
    /// day other than `today`. Purchased credits do not survive the reset.
    pub async fn reset_if_stale(
        pool: &SqlitePool,
        identity: &str,
        allowance: i64,
        today: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE users
               SET credits = $2, last_reset_date = $3
               WHERE identity = $1
                 AND (last_reset_date IS NULL OR last_reset_date <> $3)"#,
        )
        .bind(identity)
        .bind(allowance)
        .bind(today)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Takes one credit if any are left, returning the new balance.
    /// `None` means the balance was already zero (or the user is unknown).
    pub async fn consume_credit(
        pool: &SqlitePool,
        identity: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"UPDATE users
               SET credits = credits - 1
               WHERE identity = $1 AND credits > 0
               RETURNING credits"#,
        )
        .bind(identity)
        .fetch_optional(pool)
        .await
    }

    pub async fn add_credits<'e, E>(
        executor: E,
        identity: &str,
        amount: i64,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE users SET credits = credits + $2 WHERE identity = $1")
            .bind(identity)
            .bind(amount)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    fn alice() -> CreateUser {
        CreateUser {
            identity: "user_alice".to_string(),
            email: "alice@example.com".to_string(),
            name: Some("Alice".to_string()),
            image_url: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let db = DBService::new_in_memory().await.unwrap();
        assert!(User::ensure(&db.pool, &alice(), 5, day(1)).await.unwrap());
        assert!(!User::ensure(&db.pool, &alice(), 5, day(2)).await.unwrap());

        let user = User::find_by_identity(&db.pool, "user_alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.credits, 5);
        assert_eq!(user.last_reset_date, Some(day(1)));
        assert_eq!(user.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_consume_stops_at_zero() {
        let db = DBService::new_in_memory().await.unwrap();
        User::ensure(&db.pool, &alice(), 2, day(1)).await.unwrap();

        assert_eq!(User::consume_credit(&db.pool, "user_alice").await.unwrap(), Some(1));
        assert_eq!(User::consume_credit(&db.pool, "user_alice").await.unwrap(), Some(0));
        assert_eq!(User::consume_credit(&db.pool, "user_alice").await.unwrap(), None);
        assert_eq!(User::consume_credit(&db.pool, "nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reset_only_on_new_day() {
        let db = DBService::new_in_memory().await.unwrap();
        User::ensure(&db.pool, &alice(), 5, day(1)).await.unwrap();
        User::add_credits(&db.pool, "user_alice", 100).await.unwrap();

        assert!(!User::reset_if_stale(&db.pool, "user_alice", 5, day(1)).await.unwrap());
        let user = User::find_by_identity(&db.pool, "user_alice").await.unwrap().unwrap();
        assert_eq!(user.credits, 105);

        assert!(User::reset_if_stale(&db.pool, "user_alice", 5, day(2)).await.unwrap());
        let user = User::find_by_identity(&db.pool, "user_alice").await.unwrap().unwrap();
        assert_eq!(user.credits, 5);
        assert_eq!(user.last_reset_date, Some(day(2)));
    }
}
