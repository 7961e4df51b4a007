/// Message surfaced when the session cannot be recovered by a refresh.
pub const SESSION_EXPIRED: &str = "Session expired. Please login again.";

/// Errors raised by the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A 401 that a token refresh could not recover from.
    #[error("{}", SESSION_EXPIRED)]
    Unauthorized,

    /// Any other non-success response.
    #[error("{message}")]
    Request { status: u16, message: String },

    /// Network-level failure, passed through untouched.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A body that could not be encoded or did not match the expected shape.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Request { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            ApiError::Json(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Builds a `Request` error from a failed response body, falling back to
    /// `fallback` when the body carries no `message`.
    pub(crate) fn from_body(status: u16, body: &str, fallback: impl FnOnce() -> String) -> Self {
        let message = serde_json::from_str::<crate::types::ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(fallback);
        ApiError::Request { status, message }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
