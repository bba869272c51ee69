//! GitLab API errors.

use thiserror::Error;

use mergealert_core::error::{AppError, ErrorKind};

/// Failure of one GitLab call or of project URL parsing.
#[derive(Debug, Clone, Error)]
pub enum GitLabError {
    /// The stored project URL cannot be mapped to a GitLab instance.
    #[error("invalid project URL: {0}")]
    InvalidUrl(String),

    /// 401: the access token is invalid or expired.
    #[error("access token is invalid or expired")]
    Unauthorized,

    /// 403: the token lacks permission.
    #[error("access token lacks permission for this project")]
    Forbidden,

    /// 404: the project or hook does not exist (or is not visible).
    #[error("project or hook not found")]
    NotFound,

    /// 429: GitLab throttled the call.
    #[error("GitLab API rate limit reached")]
    RateLimited,

    /// 422: GitLab rejected the hook definition.
    #[error("hook rejected by GitLab: {0}")]
    Unprocessable(String),

    /// Any other unexpected status.
    #[error("GitLab API returned status {0}")]
    Status(u16),

    /// Connection or protocol failure.
    #[error("GitLab request failed: {0}")]
    Transport(String),

    /// The response body did not match the expected shape.
    #[error("failed to decode GitLab response: {0}")]
    Decode(String),

    /// The call did not finish within its deadline.
    #[error("GitLab request timed out")]
    Timeout,

    /// The caller went away before the call finished.
    #[error("GitLab request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for GitLabError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<GitLabError> for AppError {
    fn from(err: GitLabError) -> Self {
        let kind = match &err {
            GitLabError::InvalidUrl(_) | GitLabError::Unprocessable(_) => ErrorKind::Validation,
            GitLabError::Unauthorized | GitLabError::Forbidden => ErrorKind::Authentication,
            GitLabError::NotFound => ErrorKind::NotFound,
            GitLabError::RateLimited => ErrorKind::RateLimit,
            GitLabError::Timeout | GitLabError::Cancelled => ErrorKind::ServiceUnavailable,
            GitLabError::Status(_) | GitLabError::Transport(_) | GitLabError::Decode(_) => {
                ErrorKind::ExternalService
            }
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}
