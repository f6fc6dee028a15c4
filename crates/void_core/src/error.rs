//! Error types for the core library

use thiserror::Error;

/// Result type alias
pub type Result<T> = core::result::Result<T, HandleError>;

/// Handle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    /// Handle is null
    #[error("Handle is null")]
    Null,
    /// Handle is stale (generation mismatch)
    #[error("Handle {0:#x} is stale (already destroyed)")]
    Stale(u64),
    /// Handle index was never issued by this allocator
    #[error("Handle {0:#x} index out of bounds")]
    OutOfBounds(u64),
}
