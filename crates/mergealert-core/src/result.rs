//! Convenience result type alias for Merge Alert.

use crate::error::AppError;

/// A specialized `Result` type for Merge Alert operations.
pub type AppResult<T> = Result<T, AppError>;
