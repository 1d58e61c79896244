use axum::{Router, response::Json as ResponseJson, routing::get};
use utils::response::ApiResponse;

use crate::DeploymentImpl;

/// GET /api/health
pub async fn health_check() -> ResponseJson<ApiResponse<&'static str>> {
    ResponseJson(ApiResponse::success("OK"))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/health", get(health_check))
}
