use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use serde::Serialize;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::AuthUser};

#[derive(Debug, Serialize, TS)]
pub struct CreditsResponse {
    pub credits: i64,
}

/// GET /api/credits
pub async fn get_credits(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
) -> Result<ResponseJson<ApiResponse<CreditsResponse>>, ApiError> {
    let credits = deployment.ledger().balance(&user.identity).await?;
    Ok(ResponseJson(ApiResponse::success(CreditsResponse { credits })))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/credits", get(get_credits))
}
