use axum::http::StatusCode;
use axum::Json;
use larder_core::{ApplicationError, InterfaceError};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ErrorResponse = (StatusCode, Json<ApiError>);

pub fn new_correlation_id() -> String {
    format!("req-{}", &Uuid::new_v4().simple().to_string()[..12])
}

pub fn db_error(error: impl std::fmt::Display) -> ErrorResponse {
    error!(error = %error, "database error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: "an internal error occurred".to_string() }),
    )
}

/// Maps the application taxonomy onto HTTP. Validation failures keep their
/// specific message; unavailable/internal failures expose only the
/// user-safe wording and log the detail under the correlation id.
pub fn app_error(error: ApplicationError, correlation_id: &str) -> ErrorResponse {
    let interface = error.into_interface(correlation_id);
    match &interface {
        InterfaceError::BadRequest { message, correlation_id } => {
            warn!(correlation_id = %correlation_id, message = %message, "request rejected");
            (StatusCode::BAD_REQUEST, Json(ApiError { error: message.clone() }))
        }
        InterfaceError::NotFound { message, correlation_id } => {
            warn!(correlation_id = %correlation_id, message = %message, "resource not found");
            (StatusCode::NOT_FOUND, Json(ApiError { error: message.clone() }))
        }
        InterfaceError::ServiceUnavailable { message, correlation_id } => {
            error!(correlation_id = %correlation_id, message = %message, "upstream failure");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiError { error: interface.user_message().to_string() }),
            )
        }
        InterfaceError::Internal { message, correlation_id } => {
            error!(correlation_id = %correlation_id, message = %message, "internal failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError { error: interface.user_message().to_string() }),
            )
        }
    }
}
