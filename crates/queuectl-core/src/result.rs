//! Convenience result type alias for queuectl.

use crate::error::AppError;

/// A specialized `Result` type for queuectl operations.
pub type AppResult<T> = Result<T, AppError>;
