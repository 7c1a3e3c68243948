use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use backplane_access::TokenError;

#[derive(Debug)]
pub enum HttpError {
    NotFound(String),
    Forbidden(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            HttpError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            HttpError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            HttpError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<TokenError> for HttpError {
    fn from(err: TokenError) -> Self {
        HttpError::Forbidden(err.to_string())
    }
}
