use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::applications::StoreError;
use crate::attachments::{InvalidFileName, StagingError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Persistence,
    Upload,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: Option<ErrorKind>,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: None,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message).with_kind(ErrorKind::Validation)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            kind: self.kind,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

/// Failure of a job collection operation, classified by what went wrong.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),
    #[error("job application not found")]
    NotFound,
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Upload(#[from] StagingError),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Validation(_) => ErrorKind::Validation,
            JobError::NotFound => ErrorKind::NotFound,
            JobError::Persistence(_) => ErrorKind::Persistence,
            JobError::Upload(_) => ErrorKind::Upload,
        }
    }

    /// Maps to a response. Persistence and upload causes are replaced by
    /// `failure_message`; only validation messages reach the client verbatim.
    pub fn into_app_error(self, failure_message: &str) -> AppError {
        let kind = self.kind();
        match self {
            JobError::Validation(message) => AppError::bad_request(message),
            JobError::NotFound => {
                AppError::new(StatusCode::NOT_FOUND, "Job application not found").with_kind(kind)
            }
            JobError::Persistence(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, failure_message).with_kind(kind)
            }
            JobError::Upload(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, failure_message).with_kind(kind)
            }
        }
    }
}

impl From<InvalidFileName> for JobError {
    fn from(value: InvalidFileName) -> Self {
        JobError::Validation(value.to_string())
    }
}

impl From<diesel::result::Error> for JobError {
    fn from(value: diesel::result::Error) -> Self {
        JobError::Persistence(StoreError::from(value))
    }
}

impl From<diesel::r2d2::PoolError> for JobError {
    fn from(value: diesel::r2d2::PoolError) -> Self {
        JobError::Persistence(StoreError::from(value))
    }
}
