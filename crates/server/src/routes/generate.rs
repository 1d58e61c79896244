use axum::{
    Router,
    body::Body,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::post,
};
use deployment::Deployment;
use serde::Deserialize;
use ts_rs::TS;

use crate::{DeploymentImpl, error::ApiError, middleware::AuthUser};

#[derive(Debug, Deserialize, TS)]
pub struct GenerateRequest {
    pub prompt: String,
}

/// POST /api/generate
/// Charges one credit, then streams the generated page as plain text. A
/// failure after streaming has begun aborts the body.
pub async fn generate(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    axum::Json(payload): axum::Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    if payload.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("Prompt is required".to_string()));
    }

    let decision = deployment
        .ledger()
        .authorize(&user.identity, user.email_or_empty())
        .await?;
    if !decision.accepted {
        tracing::info!(identity = %user.identity, "generation refused: no credits left");
        return Err(ApiError::InsufficientCredits);
    }

    let stream = deployment.relay().relay(&payload.prompt).await?;
    Ok((
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/generate", post(generate))
}
