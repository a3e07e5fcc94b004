use application::{ApplicationError, IdentityError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        let message = error.to_string();
        match error {
            DomainError::Unauthenticated => {
                ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
            }
            DomainError::InvalidTenancy { .. } => {
                ApiError::new(StatusCode::FORBIDDEN, "INVALID_TENANCY", message)
            }
            DomainError::NotFound { .. } => ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
            DomainError::Conflict { .. } => ApiError::new(StatusCode::CONFLICT, "CONFLICT", message),
            DomainError::PermissionDenied { .. } => {
                ApiError::new(StatusCode::FORBIDDEN, "PERMISSION_DENIED", message)
            }
            DomainError::ValidationError { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(error: IdentityError) -> Self {
        let message = error.to_string();
        let (status, code) = match error {
            IdentityError::EmailAlreadyInUse => (StatusCode::CONFLICT, "EMAIL_IN_USE"),
            IdentityError::InvalidEmail => (StatusCode::BAD_REQUEST, "INVALID_EMAIL"),
            IdentityError::WeakPassword { .. } => (StatusCode::BAD_REQUEST, "WEAK_PASSWORD"),
            IdentityError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS"),
            IdentityError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            IdentityError::EmailNotVerified => (StatusCode::FORBIDDEN, "EMAIL_NOT_VERIFIED"),
            IdentityError::AlreadyVerified => (StatusCode::CONFLICT, "ALREADY_VERIFIED"),
            IdentityError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            IdentityError::InvalidVerificationToken => {
                (StatusCode::BAD_REQUEST, "INVALID_VERIFICATION_TOKEN")
            }
            IdentityError::Backend(_) => (StatusCode::BAD_GATEWAY, "IDENTITY_BACKEND_ERROR"),
        };
        ApiError::new(status, code, message)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(err) => err.into(),
            ApplicationError::Identity(err) => err.into(),
            ApplicationError::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                RepositoryError::Storage { message } => {
                    tracing::error!(error = %message, "storage failure");
                    ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        "storage is temporarily unavailable",
                    )
                }
            },
            ApplicationError::Broadcast(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "BROADCAST_ERROR",
                err.to_string(),
            ),
            ApplicationError::Infrastructure(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INFRASTRUCTURE_ERROR",
                message,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
