//! Unified error handling for MemForge
//!
//! Domain errors stay close to the code that raises them (`PoolError` in
//! the memory module, `DeviceError` at the backend boundary); this module
//! consolidates them into a single type with error categorization for
//! callers that handle both.

use std::fmt;

use thiserror::Error;

use crate::backend::DeviceError;
use crate::memory::PoolError;

/// Unified error type for MemForge
#[derive(Debug, Error)]
pub enum MemForgeError {
    /// Pool-level failure (invalid size, out of memory, unknown handle)
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Device-level failure outside any pool operation
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl MemForgeError {
    /// Categorize the error for handling decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            // Caller passed a size the pool cannot represent.
            MemForgeError::Pool(PoolError::InvalidSize(_)) => ErrorCategory::User,

            // Device conditions; may succeed later when memory frees up.
            MemForgeError::Pool(PoolError::OutOfMemory(_)) => ErrorCategory::Backend,
            MemForgeError::Device(_) => ErrorCategory::Backend,

            // Corruption signal, indicates a bug.
            MemForgeError::Pool(PoolError::UnknownHandle(_)) => ErrorCategory::Internal,
        }
    }

    /// Check if this error is a temporary condition worth retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Backend)
    }

    /// Check if this error is actionable by the caller (bad input).
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this error indicates a bug.
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User error - invalid request
    User,
    /// Backend error - device condition, possibly temporary
    Backend,
    /// Internal error - indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Backend => write!(f, "Backend"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

/// Helper type alias for Results using MemForgeError
pub type MemForgeResult<T> = std::result::Result<T, MemForgeError>;
