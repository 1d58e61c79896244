use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    auth::AuthError, copywriting::CopywritingError, credits::CreditError, editor::EditorError,
    generation::GenerationError, payments::PaymentError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Credit(#[from] CreditError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Copywriting(#[from] CopywritingError),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Insufficient credits. Please upgrade.")]
    InsufficientCredits,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// Status, public message, and optional detail for the response body.
    fn parts(&self) -> (StatusCode, String, Option<String>) {
        let internal = |message: &str| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                message.to_string(),
                Some(self.to_string()),
            )
        };

        match self {
            ApiError::Generation(GenerationError::EmptyPrompt) => {
                (StatusCode::BAD_REQUEST, "Prompt is required".to_string(), None)
            }
            ApiError::Generation(_) => internal("Failed to generate code"),
            ApiError::Credit(_) => internal("Failed to check credits"),
            ApiError::Payment(err) => match err {
                PaymentError::NotConfigured => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Payments are not configured".to_string(),
                    None,
                ),
                PaymentError::OrderNotFound => {
                    (StatusCode::NOT_FOUND, "Order not found".to_string(), None)
                }
                PaymentError::NotPaid => {
                    (StatusCode::BAD_REQUEST, "Payment not successful".to_string(), None)
                }
                PaymentError::Transport(_) | PaymentError::Gateway { .. } | PaymentError::Serde(_) => (
                    StatusCode::BAD_GATEWAY,
                    "Payment gateway error".to_string(),
                    Some(err.to_string()),
                ),
                PaymentError::Database(_)
                | PaymentError::Credit(_)
                | PaymentError::AccountMissing(_) => {
                    internal("Verification failed")
                }
            },
            ApiError::Copywriting(
                err @ (CopywritingError::EmptyText | CopywritingError::EmptyPrompt),
            ) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            ApiError::Copywriting(CopywritingError::Generation(_)) => {
                internal("Failed to generate text")
            }
            ApiError::Editor(
                err @ (EditorError::NoCommands | EditorError::InvalidCommand { .. }),
            ) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            ApiError::Editor(_) => internal("Failed to apply edits"),
            ApiError::Auth(_) | ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None)
            }
            ApiError::Database(_) => internal("Internal server error"),
            ApiError::InsufficientCredits => (StatusCode::FORBIDDEN, self.to_string(), None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string(), None),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone(), None),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = self.parts();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = match details {
            Some(details) => ApiResponse::<()>::error_with_details(message, details),
            None => ApiResponse::<()>::error(message),
        };
        (status, Json(body)).into_response()
    }
}
