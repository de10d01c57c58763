use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use larder_core::AppUser;
use larder_db::SqlUserRepository;

use crate::api::{db_error, ApiError, ErrorResponse};
use crate::bootstrap::AppState;

pub const USER_HEADER: &str = "x-user";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The acting user, resolved explicitly from the request identity headers
/// and synced into `app_user` on first sight. Every core operation takes
/// this as a parameter; there is no ambient security context.
pub struct ActingUser(pub AppUser);

impl FromRequestParts<AppState> for ActingUser {
    type Rejection = ErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        let Some(subject) = subject else {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiError { error: format!("missing {USER_HEADER} header") }),
            ));
        };

        let email = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        let user = SqlUserRepository::new(state.pool.clone())
            .sync(subject, email)
            .await
            .map_err(db_error)?;

        Ok(Self(user))
    }
}
