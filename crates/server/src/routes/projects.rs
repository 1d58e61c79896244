use axum::{
    Router,
    extract::{Path, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Json as ResponseJson, Response},
    routing::{get, post, put},
};
use db::models::{
    chat::{Chat, ChatRole, CreateChat},
    frame::Frame,
    project::{CreateProject, Project, ProjectWithCode},
};
use deployment::Deployment;
use preview::ExportFile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use services::services::editor;
use ts_rs::TS;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::AuthUser};

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectResponse {
    pub project_id: Uuid,
    pub frame_id: Uuid,
}

#[derive(Debug, Deserialize, TS)]
pub struct SaveCodeRequest {
    pub html: String,
}

#[derive(Debug, Deserialize, TS)]
pub struct ApplyEditsRequest {
    /// `UPDATE_ELEMENT` protocol messages, applied in order.
    #[ts(type = "Array<unknown>")]
    pub commands: Vec<Value>,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEditsResponse {
    pub frame_id: Uuid,
    pub applied: usize,
    pub code: String,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateMessageRequest {
    pub role: Option<ChatRole>,
    pub message: Option<String>,
}

async fn owned_project(
    deployment: &DeploymentImpl,
    id: Uuid,
    owner: &str,
) -> Result<Project, ApiError> {
    Project::find_for_owner(&deployment.db().pool, id, owner)
        .await?
        .ok_or(ApiError::NotFound("Project not found"))
}

async fn latest_code(deployment: &DeploymentImpl, project_id: Uuid) -> Result<String, ApiError> {
    Ok(Frame::find_latest(&deployment.db().pool, project_id)
        .await?
        .map(|frame| frame.code)
        .unwrap_or_default())
}

/// POST /api/projects
pub async fn create_project(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    axum::Json(payload): axum::Json<CreateProject>,
) -> Result<ResponseJson<ApiResponse<CreateProjectResponse>>, ApiError> {
    let (project, frame) =
        Project::create_with_frame(&deployment.db().pool, &user.identity, &payload).await?;
    tracing::info!(project_id = %project.id, identity = %user.identity, "project created");

    Ok(ResponseJson(ApiResponse::success(CreateProjectResponse {
        project_id: project.id,
        frame_id: frame.id,
    })))
}

/// GET /api/projects
pub async fn list_projects(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<Project>>>, ApiError> {
    let projects = Project::find_by_owner(&deployment.db().pool, &user.identity).await?;
    Ok(ResponseJson(ApiResponse::success(projects)))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ProjectWithCode>>, ApiError> {
    let project = owned_project(&deployment, id, &user.identity).await?;
    let code = latest_code(&deployment, project.id).await?;
    Ok(ResponseJson(ApiResponse::success(ProjectWithCode { project, code })))
}

/// PUT /api/projects/{id}/code
/// Stores a saved document as the project's newest frame.
pub async fn save_code(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    axum::Json(payload): axum::Json<SaveCodeRequest>,
) -> Result<ResponseJson<ApiResponse<Frame>>, ApiError> {
    let project = owned_project(&deployment, id, &user.identity).await?;
    let frame = Frame::create(&deployment.db().pool, project.id, &payload.html).await?;
    Ok(ResponseJson(ApiResponse::success(frame)))
}

/// POST /api/projects/{id}/edits
/// Applies element updates to the newest frame and saves the result.
pub async fn apply_edits(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    axum::Json(payload): axum::Json<ApplyEditsRequest>,
) -> Result<ResponseJson<ApiResponse<ApplyEditsResponse>>, ApiError> {
    let project = owned_project(&deployment, id, &user.identity).await?;
    let code = latest_code(&deployment, project.id).await?;

    let outcome = editor::apply_edits(&code, &payload.commands)?;
    let frame = Frame::create(&deployment.db().pool, project.id, &outcome.html).await?;

    Ok(ResponseJson(ApiResponse::success(ApplyEditsResponse {
        frame_id: frame.id,
        applied: outcome.applied,
        code: outcome.html,
    })))
}

/// GET /api/projects/{id}/export
pub async fn export_project(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let project = owned_project(&deployment, id, &user.identity).await?;
    let export = ExportFile::html(latest_code(&deployment, project.id).await?);

    Ok((
        [
            (CONTENT_TYPE, format!("{}; charset=utf-8", export.content_type)),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.file_name),
            ),
        ],
        export.contents,
    )
        .into_response())
}

/// GET /api/projects/{id}/chats
pub async fn list_chats(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Chat>>>, ApiError> {
    let project = owned_project(&deployment, id, &user.identity).await?;
    let chats = Chat::find_by_project(&deployment.db().pool, project.id).await?;
    Ok(ResponseJson(ApiResponse::success(chats)))
}

/// POST /api/projects/{id}/message
pub async fn create_message(
    State(deployment): State<DeploymentImpl>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    axum::Json(payload): axum::Json<CreateMessageRequest>,
) -> Result<ResponseJson<ApiResponse<Chat>>, ApiError> {
    let (Some(role), Some(message)) = (
        payload.role,
        payload.message.filter(|message| !message.is_empty()),
    ) else {
        return Err(ApiError::BadRequest("Missing role or message".to_string()));
    };

    let project = owned_project(&deployment, id, &user.identity).await?;
    let chat = Chat::create(
        &deployment.db().pool,
        project.id,
        &CreateChat { role, message },
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(chat)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/{id}", get(get_project))
        .route("/projects/{id}/code", put(save_code))
        .route("/projects/{id}/edits", post(apply_edits))
        .route("/projects/{id}/export", get(export_project))
        .route("/projects/{id}/chats", get(list_chats))
        .route("/projects/{id}/message", post(create_message))
}
