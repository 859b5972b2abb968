use axum::{
    extract::{multipart::MultipartRejection, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::pages;
use crate::redirect::{Found, login_url};

/// Terminal failures of a request. Form validation problems are not errors:
/// handlers answer those by re-rendering the form.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,

    #[error("actor may not modify this resource")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication required for {next}")]
    Unauthenticated { next: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                pages::error_page("Not found", "The page you asked for does not exist."),
            )
                .into_response(),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                pages::error_page("Forbidden", "You are not allowed to do that."),
            )
                .into_response(),
            ApiError::BadRequest(reason) => {
                warn!("Bad request: {}", reason);
                (
                    StatusCode::BAD_REQUEST,
                    pages::error_page("Bad request", "The request could not be understood."),
                )
                    .into_response()
            }
            ApiError::Unauthenticated { next } => Found(login_url(&next)).into_response(),
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    pages::error_page("Server error", "Something went wrong on our side."),
                )
                    .into_response()
            }
        }
    }
}

// Body rejections are only surfaced once the target resource has been
// resolved and authorized, so handlers extract them as `Result<_, _>`.
impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Shorthand for turning a missing row into a 404.
pub trait OrNotFound<T> {
    fn or_not_found(self) -> Result<T, ApiError>;
}

impl<T> OrNotFound<T> for Option<T> {
    fn or_not_found(self) -> Result<T, ApiError> {
        self.ok_or(ApiError::NotFound)
    }
}

/// Numeric path ids; anything unparseable is a missing resource, not a bad request.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound)
}
