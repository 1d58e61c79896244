use axum::{Router, extract::State, response::Json as ResponseJson, routing::post};
use deployment::Deployment;
use serde::Deserialize;
use serde_json::Value;
use services::services::payments::{Customer, VerifiedPayment};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::AuthUser};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub order_id: String,
}

/// POST /api/payment/order
/// Returns the gateway's order document; the client opens checkout with it.
pub async fn create_order(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
) -> Result<ResponseJson<ApiResponse<Value>>, ApiError> {
    let customer = Customer {
        identity: &user.identity,
        email: user.email.as_deref(),
        name: user.name.as_deref(),
    };
    let order = deployment.payments().create_order(&customer).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

/// POST /api/payment/verify
pub async fn verify_payment(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    axum::Json(payload): axum::Json<VerifyPaymentRequest>,
) -> Result<ResponseJson<ApiResponse<VerifiedPayment>>, ApiError> {
    let verified = deployment
        .payments()
        .verify(&user.identity, &payload.order_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(verified)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/payment/order", post(create_order))
        .route("/payment/verify", post(verify_payment))
}
