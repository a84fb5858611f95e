use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, models::UserId};

/// Identifies the calling user. Authentication happens upstream of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Moves the `x-user-id` header into a [`UserId`] extension; requests
/// without one are rejected with 401.
pub async fn user_id_middleware(mut request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(UserId::from);

    match user {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => AppError::Unauthorized(format!("missing {} header", USER_ID_HEADER)).into_response(),
    }
}
