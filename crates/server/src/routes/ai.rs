use axum::{Router, extract::State, response::Json as ResponseJson, routing::post};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::copywriting::GeneratedImage;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::AuthUser};

#[derive(Debug, Deserialize, TS)]
pub struct RewriteRequest {
    #[serde(default)]
    pub text: String,
    pub tone: Option<String>,
}

#[derive(Debug, Serialize, TS)]
pub struct RewriteResponse {
    pub text: String,
}

#[derive(Debug, Deserialize, TS)]
pub struct PromptRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EnhancePromptResponse {
    pub enhanced_prompt: String,
}

/// POST /api/ai/rewrite
pub async fn rewrite(
    State(deployment): State<DeploymentImpl>,
    AuthUser(_user): AuthUser,
    axum::Json(payload): axum::Json<RewriteRequest>,
) -> Result<ResponseJson<ApiResponse<RewriteResponse>>, ApiError> {
    let text = deployment
        .copywriter()
        .rewrite(&payload.text, payload.tone.as_deref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(RewriteResponse { text })))
}

/// POST /api/enhance-prompt
pub async fn enhance_prompt(
    State(deployment): State<DeploymentImpl>,
    AuthUser(_user): AuthUser,
    axum::Json(payload): axum::Json<PromptRequest>,
) -> Result<ResponseJson<ApiResponse<EnhancePromptResponse>>, ApiError> {
    let enhanced_prompt = deployment.copywriter().enhance_prompt(&payload.prompt).await?;
    Ok(ResponseJson(ApiResponse::success(EnhancePromptResponse {
        enhanced_prompt,
    })))
}

/// POST /api/images/generate
pub async fn generate_image(
    State(deployment): State<DeploymentImpl>,
    AuthUser(_user): AuthUser,
    axum::Json(payload): axum::Json<PromptRequest>,
) -> Result<ResponseJson<ApiResponse<GeneratedImage>>, ApiError> {
    let image = deployment.copywriter().generate_image(&payload.prompt).await?;
    Ok(ResponseJson(ApiResponse::success(image)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/ai/rewrite", post(rewrite))
        .route("/enhance-prompt", post(enhance_prompt))
        .route("/images/generate", post(generate_image))
}
