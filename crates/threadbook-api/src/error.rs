use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Classes the transport layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid thread type '{0}'")]
    InvalidType(String),

    #[error("forbidden")]
    Forbidden,

    #[error("thread not found")]
    ThreadNotFound,

    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("user '{0}' is not a member of the spool")]
    UserNotInSpool(String),

    #[error("thread is closed")]
    ThreadClosed,

    #[error("no rights to join thread room")]
    NoRightsOnJoinRoom,

    #[error("failed to ensure room")]
    FailedToEnsureRoom(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidType(_) => ErrorKind::InvalidInput,
            Self::Forbidden | Self::NoRightsOnJoinRoom => ErrorKind::Forbidden,
            Self::ThreadNotFound | Self::UserNotFound(_) => ErrorKind::NotFound,
            Self::UserNotInSpool(_) | Self::ThreadClosed => ErrorKind::Conflict,
            Self::FailedToEnsureRoom(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidType(_) => "invalid_thread_type",
            Self::Forbidden => "forbidden",
            Self::ThreadNotFound => "thread_not_found",
            Self::UserNotFound(_) => "user_not_found",
            Self::UserNotInSpool(_) => "user_not_in_spool",
            Self::ThreadClosed => "thread_closed",
            Self::NoRightsOnJoinRoom => "no_rights_on_join_room",
            Self::FailedToEnsureRoom(_) => "failed_to_ensure_room",
            Self::Internal(_) => "internal",
        }
    }
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Extractor failures answer with the same `{ "error": code }` body as
// everything else.

impl From<JsonRejection> for CoreError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for CoreError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for CoreError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!("request failed: {:#}", e);
        }
        let body = Json(serde_json::json!({ "error": self.code() }));
        (self.kind().status(), body).into_response()
    }
}
