use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use meridian_core::Error;
use serde_json::json;
use tracing::{error, warn};

/// Client-facing message for rejected ledger changes.
const POINTS_UNAVAILABLE: &str = "unable to update points";

/// A failed request: status code plus a message safe to show the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid credentials")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InsufficientBalance { .. } | Error::AlreadyReferred(_) => {
                warn!("Points update rejected: {}", err);
                return Self::new(StatusCode::CONFLICT, POINTS_UNAVAILABLE);
            }
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Storage(e) => {
                error!("Storage failure: {:#}", e);
                return Self::internal();
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
