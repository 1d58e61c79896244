use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

/// A credit-pack order handed to the payment gateway.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PaymentOrder {
    pub order_id: String,
    pub identity: String,
    /// Amount in the currency's minor unit (paise for INR).
    pub amount_minor: i64,
    pub currency: String,
    pub credits: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentOrder {
    pub order_id: String,
    pub identity: String,
    pub amount_minor: i64,
    pub currency: String,
    pub credits: i64,
}

impl PaymentOrder {
    pub async fn create(pool: &SqlitePool, data: &CreatePaymentOrder) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PaymentOrder>(
            r#"INSERT INTO payment_orders (order_id, identity, amount_minor, currency, credits)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING order_id, identity, amount_minor, currency, credits, status, created_at, paid_at"#,
        )
        .bind(&data.order_id)
        .bind(&data.identity)
        .bind(data.amount_minor)
        .bind(&data.currency)
        .bind(data.credits)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_order_id(
        pool: &SqlitePool,
        order_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PaymentOrder>(
            r#"SELECT order_id, identity, amount_minor, currency, credits, status, created_at, paid_at
               FROM payment_orders
               WHERE order_id = $1"#,
        )
        .bind(order_id)
        .fetch_optional(pool)
        .await
    }

    /// Flips a pending order to paid. Returns false when it was already
    /// paid, so the caller grants credits at most once.
    pub async fn mark_paid<'e, E>(executor: E, order_id: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE payment_orders
               SET status = 'paid', paid_at = datetime('now', 'subsec')
               WHERE order_id = $1 AND status = 'pending'"#,
        )
        .bind(order_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn test_mark_paid_once() {
        let db = DBService::new_in_memory().await.unwrap();
        let order = PaymentOrder::create(
            &db.pool,
            &CreatePaymentOrder {
                order_id: "order_1700000000000".to_string(),
                identity: "user_a".to_string(),
                amount_minor: 7900,
                currency: "INR".to_string(),
                credits: 100,
            },
        )
        .await
        .unwrap();
        assert_eq!(order.status, PaymentStatus::Pending);
        assert!(order.paid_at.is_none());

        assert!(PaymentOrder::mark_paid(&db.pool, &order.order_id).await.unwrap());
        assert!(!PaymentOrder::mark_paid(&db.pool, &order.order_id).await.unwrap());

        let stored = PaymentOrder::find_by_order_id(&db.pool, &order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert!(stored.paid_at.is_some());
    }
}
