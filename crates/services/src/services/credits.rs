//! Credit Ledger: per-identity daily allowance gating generation.

use chrono::{Local, NaiveDate};
use db::models::user::{CreateUser, User};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use ts_rs::TS;

/// Reported as the remaining balance for the exempt identity.
pub const EXEMPT_REMAINING: i64 = 9999;

#[derive(Debug, Error)]
pub enum CreditError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Outcome of one authorization. A refusal is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
pub struct CreditDecision {
    #[serde(rename = "success")]
    pub accepted: bool,
    pub remaining: i64,
}

impl CreditDecision {
    fn accepted(remaining: i64) -> Self {
        Self {
            accepted: true,
            remaining,
        }
    }

    fn refused() -> Self {
        Self {
            accepted: false,
            remaining: 0,
        }
    }
}

#[derive(Clone)]
pub struct CreditLedger {
    pool: SqlitePool,
    daily_allowance: i64,
    exempt_email: Option<String>,
}

impl CreditLedger {
    pub fn new(pool: SqlitePool, daily_allowance: i64, exempt_email: Option<String>) -> Self {
        Self {
            pool,
            daily_allowance,
            exempt_email,
        }
    }

    pub fn daily_allowance(&self) -> i64 {
        self.daily_allowance
    }

    fn is_exempt(&self, email: &str) -> bool {
        self.exempt_email.as_deref() == Some(email)
    }

    /// Makes sure `identity` has a record, starting it at today's allowance.
    pub async fn open_account(&self, identity: &str, email: &str) -> Result<(), CreditError> {
        self.ensure_record(identity, email, Local::now().date_naive())
            .await
    }

    async fn ensure_record(
        &self,
        identity: &str,
        email: &str,
        today: NaiveDate,
    ) -> Result<(), CreditError> {
        let new_user = CreateUser {
            identity: identity.to_string(),
            email: email.to_string(),
            name: None,
            image_url: None,
        };
        if User::ensure(&self.pool, &new_user, self.daily_allowance, today).await? {
            tracing::info!(identity, "created credit record");
        }
        Ok(())
    }

    /// Authorizes one generation for `identity` against today's server-local
    /// calendar day.
    pub async fn authorize(&self, identity: &str, email: &str) -> Result<CreditDecision, CreditError> {
        self.authorize_on(identity, email, Local::now().date_naive())
            .await
    }

    /// Creates the record on first sight, restores the allowance when `today`
    /// differs from the stored reset day, then takes one credit. The exempt
    /// identity is always accepted and never charged.
    pub async fn authorize_on(
        &self,
        identity: &str,
        email: &str,
        today: NaiveDate,
    ) -> Result<CreditDecision, CreditError> {
        self.ensure_record(identity, email, today).await?;
        if User::reset_if_stale(&self.pool, identity, self.daily_allowance, today).await? {
            tracing::debug!(identity, %today, "daily credits restored");
        }

        if self.is_exempt(email) {
            return Ok(CreditDecision::accepted(EXEMPT_REMAINING));
        }

        let decision = match User::consume_credit(&self.pool, identity).await? {
            Some(remaining) => CreditDecision::accepted(remaining),
            None => CreditDecision::refused(),
        };
        tracing::debug!(
            identity,
            accepted = decision.accepted,
            remaining = decision.remaining,
            "credit authorization"
        );
        Ok(decision)
    }

    /// Current balance; unknown identities have none.
    pub async fn balance(&self, identity: &str) -> Result<i64, CreditError> {
        Ok(User::find_by_identity(&self.pool, identity)
            .await?
            .map(|user| user.credits)
            .unwrap_or(0))
    }

    /// Adds purchased credits. Returns false when the identity has no record.
    pub async fn grant(&self, identity: &str, amount: i64) -> Result<bool, CreditError> {
        let updated = User::add_credits(&self.pool, identity, amount).await?;
        Ok(updated == 1)
    }
}
