//! Credit-pack purchases through the Cashfree payment gateway.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use db::models::{
    payment_order::{CreatePaymentOrder, PaymentOrder, PaymentStatus},
    user::User,
};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use ts_rs::TS;

use super::{
    config::{CashfreeConfig, CashfreeEnvironment},
    credits::{CreditError, CreditLedger},
};

const CASHFREE_API_VERSION: &str = "2023-08-01";
const PLACEHOLDER_PHONE: &str = "9999999999";
const PLACEHOLDER_NAME: &str = "Creator";
const SUCCESS_STATUS: &str = "SUCCESS";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payments are not configured")]
    NotConfigured,
    #[error("order not found")]
    OrderNotFound,
    #[error("Payment not successful")]
    NotPaid,
    #[error("network error: {0}")]
    Transport(String),
    #[error("gateway returned {status}: {body}")]
    Gateway { status: u16, body: String },
    #[error("json error: {0}")]
    Serde(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Credit(#[from] CreditError),
    #[error("no credit account for {0}")]
    AccountMissing(String),
}

/// What one purchase costs and what it buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPack {
    pub amount_minor: i64,
    pub currency: &'static str,
    pub credits: i64,
}

impl Default for CreditPack {
    fn default() -> Self {
        Self {
            amount_minor: 7900,
            currency: "INR",
            credits: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub customer_id: String,
    pub customer_phone: String,
    pub customer_email: String,
    pub customer_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderMeta {
    pub return_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_amount: f64,
    pub order_currency: String,
    pub order_id: String,
    pub customer_details: CustomerDetails,
    pub order_meta: OrderMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub payment_status: String,
    #[serde(default)]
    pub cf_payment_id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPayment {
    pub order_id: String,
    pub credits_granted: i64,
    /// True when an earlier verification already granted the credits.
    pub already_credited: bool,
}

/// Who is paying.
#[derive(Debug, Clone)]
pub struct Customer<'a> {
    pub identity: &'a str,
    pub email: Option<&'a str>,
    pub name: Option<&'a str>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers the order; returns the gateway's order document verbatim.
    async fn create_order(&self, order: &OrderRequest) -> Result<Value, PaymentError>;

    async fn fetch_payments(&self, order_id: &str) -> Result<Vec<GatewayPayment>, PaymentError>;
}

/// Cashfree PG REST client.
#[derive(Debug, Clone)]
pub struct CashfreeClient {
    http: Client,
    app_id: String,
    secret_key: SecretString,
    environment: CashfreeEnvironment,
}

impl CashfreeClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(config: &CashfreeConfig) -> Result<Self, PaymentError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("site-builder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            app_id: config.app_id.clone(),
            secret_key: config.secret_key.clone(),
            environment: config.environment,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.environment.base_url(), path))
            .header("x-client-id", &self.app_id)
            .header("x-client-secret", self.secret_key.expose_secret())
            .header("x-api-version", CASHFREE_API_VERSION)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, PaymentError> {
        let res = builder
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;
        match res.status() {
            s if s.is_success() => res
                .json::<T>()
                .await
                .map_err(|e| PaymentError::Serde(e.to_string())),
            StatusCode::NOT_FOUND => Err(PaymentError::OrderNotFound),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                tracing::error!(status, body = %body, "Cashfree request failed");
                Err(PaymentError::Gateway { status, body })
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for CashfreeClient {
    async fn create_order(&self, order: &OrderRequest) -> Result<Value, PaymentError> {
        self.send(self.request(reqwest::Method::POST, "/orders").json(order))
            .await
    }

    async fn fetch_payments(&self, order_id: &str) -> Result<Vec<GatewayPayment>, PaymentError> {
        let path = format!("/orders/{}/payments", urlencoding::encode(order_id));
        self.send(self.request(reqwest::Method::GET, &path)).await
    }
}

#[derive(Clone)]
pub struct PaymentService {
    pool: SqlitePool,
    gateway: Option<Arc<dyn PaymentGateway>>,
    ledger: CreditLedger,
    app_url: String,
    pack: CreditPack,
}

impl PaymentService {
    pub fn new(
        pool: SqlitePool,
        gateway: Option<Arc<dyn PaymentGateway>>,
        ledger: CreditLedger,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            gateway,
            ledger,
            app_url: app_url.into(),
            pack: CreditPack::default(),
        }
    }

    pub fn pack(&self) -> CreditPack {
        self.pack
    }

    fn gateway(&self) -> Result<&Arc<dyn PaymentGateway>, PaymentError> {
        self.gateway.as_ref().ok_or(PaymentError::NotConfigured)
    }

    /// Opens a gateway order for one credit pack and records it as pending.
    pub async fn create_order(&self, customer: &Customer<'_>) -> Result<Value, PaymentError> {
        let gateway = self.gateway()?;
        let order_id = format!("order_{}", Utc::now().timestamp_millis());
        let request = OrderRequest {
            order_amount: self.pack.amount_minor as f64 / 100.0,
            order_currency: self.pack.currency.to_string(),
            order_id: order_id.clone(),
            customer_details: CustomerDetails {
                customer_id: customer.identity.to_string(),
                customer_phone: PLACEHOLDER_PHONE.to_string(),
                customer_email: customer
                    .email
                    .unwrap_or("customer@example.com")
                    .to_string(),
                customer_name: customer.name.unwrap_or(PLACEHOLDER_NAME).to_string(),
            },
            order_meta: OrderMeta {
                return_url: format!("{}/pricing?order_id={order_id}", self.app_url),
            },
        };

        let response = gateway.create_order(&request).await?;

        self.ledger
            .open_account(customer.identity, customer.email.unwrap_or_default())
            .await?;
        PaymentOrder::create(
            &self.pool,
            &CreatePaymentOrder {
                order_id: order_id.clone(),
                identity: customer.identity.to_string(),
                amount_minor: self.pack.amount_minor,
                currency: self.pack.currency.to_string(),
                credits: self.pack.credits,
            },
        )
        .await?;
        tracing::info!(order_id = %order_id, identity = customer.identity, "payment order created");

        Ok(response)
    }

    /// Grants the pack's credits once the gateway reports a successful
    /// payment. Repeated calls for a paid order grant nothing more.
    pub async fn verify(&self, identity: &str, order_id: &str) -> Result<VerifiedPayment, PaymentError> {
        let order = PaymentOrder::find_by_order_id(&self.pool, order_id)
            .await?
            .filter(|order| order.identity == identity)
            .ok_or(PaymentError::OrderNotFound)?;

        if order.status == PaymentStatus::Paid {
            return Ok(VerifiedPayment {
                order_id: order.order_id,
                credits_granted: 0,
                already_credited: true,
            });
        }

        let payments = self.gateway()?.fetch_payments(order_id).await?;
        if !payments.iter().any(|p| p.payment_status == SUCCESS_STATUS) {
            tracing::info!(order_id, payments = payments.len(), "payment not successful");
            return Err(PaymentError::NotPaid);
        }

        let mut tx = self.pool.begin().await?;
        let newly_paid = PaymentOrder::mark_paid(&mut *tx, order_id).await?;
        if newly_paid && User::add_credits(&mut *tx, identity, order.credits).await? != 1 {
            tracing::error!(order_id, identity, "paid order has no credit account");
            return Err(PaymentError::AccountMissing(identity.to_string()));
        }
        tx.commit().await?;

        if newly_paid {
            tracing::info!(order_id, identity, credits = order.credits, "credits granted");
        }
        Ok(VerifiedPayment {
            order_id: order.order_id,
            credits_granted: if newly_paid { order.credits } else { 0 },
            already_credited: !newly_paid,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use db::DBService;

    use super::*;

    #[derive(Default)]
    struct FakeGateway {
        statuses: Mutex<Vec<String>>,
        orders: Mutex<Vec<OrderRequest>>,
    }

    impl FakeGateway {
        fn set_statuses(&self, statuses: &[&str]) {
            *self.statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_order(&self, order: &OrderRequest) -> Result<Value, PaymentError> {
            self.orders.lock().unwrap().push(order.clone());
            Ok(serde_json::json!({
                "order_id": order.order_id,
                "payment_session_id": "session_test",
                "order_status": "ACTIVE",
            }))
        }

        async fn fetch_payments(&self, _order_id: &str) -> Result<Vec<GatewayPayment>, PaymentError> {
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .iter()
                .map(|status| GatewayPayment {
                    payment_status: status.clone(),
                    cf_payment_id: None,
                })
                .collect())
        }
    }

    async fn service() -> (PaymentService, Arc<FakeGateway>, CreditLedger) {
        let db = DBService::new_in_memory().await.unwrap();
        let ledger = CreditLedger::new(db.pool.clone(), 5, None);
        let gateway = Arc::new(FakeGateway::default());
        let service = PaymentService::new(
            db.pool,
            Some(gateway.clone() as Arc<dyn PaymentGateway>),
            ledger.clone(),
            "https://builder.example.com",
        );
        (service, gateway, ledger)
    }

    fn alice() -> Customer<'static> {
        Customer {
            identity: "user_alice",
            email: Some("alice@example.com"),
            name: None,
        }
    }

    async fn place_order(service: &PaymentService) -> String {
        let response = service.create_order(&alice()).await.unwrap();
        response["order_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_order() {
        let (service, gateway, ledger) = service().await;
        let order_id = place_order(&service).await;

        assert!(order_id.starts_with("order_"));
        let sent = gateway.orders.lock().unwrap()[0].clone();
        assert_eq!(sent.order_amount, 79.0);
        assert_eq!(sent.order_currency, "INR");
        assert_eq!(sent.customer_details.customer_name, "Creator");
        assert_eq!(
            sent.order_meta.return_url,
            format!("https://builder.example.com/pricing?order_id={order_id}")
        );
        assert_eq!(ledger.balance("user_alice").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_verify_grants_once() {
        let (service, gateway, ledger) = service().await;
        let order_id = place_order(&service).await;
        gateway.set_statuses(&["FAILED", "SUCCESS"]);

        let first = service.verify("user_alice", &order_id).await.unwrap();
        assert_eq!(first.credits_granted, 100);
        assert!(!first.already_credited);

        let second = service.verify("user_alice", &order_id).await.unwrap();
        assert_eq!(second.credits_granted, 0);
        assert!(second.already_credited);

        assert_eq!(ledger.balance("user_alice").await.unwrap(), 105);
    }

    #[tokio::test]
    async fn test_customer_without_email_is_credited() {
        let (service, gateway, ledger) = service().await;
        let customer = Customer {
            identity: "user_anon",
            email: None,
            name: None,
        };
        let response = service.create_order(&customer).await.unwrap();
        let order_id = response["order_id"].as_str().unwrap().to_string();
        gateway.set_statuses(&["SUCCESS"]);

        let verified = service.verify("user_anon", &order_id).await.unwrap();
        assert_eq!(verified.credits_granted, 100);
        assert_eq!(ledger.balance("user_anon").await.unwrap(), 105);
    }

    #[tokio::test]
    async fn test_missing_account_leaves_order_pending() {
        let (service, gateway, ledger) = service().await;
        let order_id = place_order(&service).await;
        gateway.set_statuses(&["SUCCESS"]);
        sqlx::query("DELETE FROM users WHERE identity = $1")
            .bind("user_alice")
            .execute(&service.pool)
            .await
            .unwrap();

        assert!(matches!(
            service.verify("user_alice", &order_id).await,
            Err(PaymentError::AccountMissing(_))
        ));
        let order = PaymentOrder::find_by_order_id(&service.pool, &order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, PaymentStatus::Pending);

        ledger.open_account("user_alice", "alice@example.com").await.unwrap();
        let verified = service.verify("user_alice", &order_id).await.unwrap();
        assert_eq!(verified.credits_granted, 100);
        assert!(!verified.already_credited);
        assert_eq!(ledger.balance("user_alice").await.unwrap(), 105);
    }

    #[tokio::test]
    async fn test_unpaid_order() {
        let (service, gateway, ledger) = service().await;
        let order_id = place_order(&service).await;
        gateway.set_statuses(&["PENDING"]);

        assert!(matches!(
            service.verify("user_alice", &order_id).await,
            Err(PaymentError::NotPaid)
        ));
        assert_eq!(ledger.balance("user_alice").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_foreign_or_unknown_order() {
        let (service, gateway, _) = service().await;
        let order_id = place_order(&service).await;
        gateway.set_statuses(&["SUCCESS"]);

        assert!(matches!(
            service.verify("user_mallory", &order_id).await,
            Err(PaymentError::OrderNotFound)
        ));
        assert!(matches!(
            service.verify("user_alice", "order_0").await,
            Err(PaymentError::OrderNotFound)
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_gateway() {
        let db = DBService::new_in_memory().await.unwrap();
        let ledger = CreditLedger::new(db.pool.clone(), 5, None);
        let service = PaymentService::new(db.pool, None, ledger, "http://localhost:3000");
        assert!(matches!(
            service.create_order(&alice()).await,
            Err(PaymentError::NotConfigured)
        ));
    }
}
