//! Error types for the event system

use std::collections::TryReserveError;
use thiserror::Error;

/// Result type for event operations
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors that can occur in the event system
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Publishing or dispatching on a bus that was never created
    #[error("Event bus {0:#018x} not found")]
    BusNotFound(u64),

    /// Dispatch called on a bus from inside its own dispatch
    #[error("Event bus {0:#018x} is already dispatching")]
    ReentrantDispatch(u64),

    /// Bus or event id collides with a reserved table marker
    #[error("Id {0:#018x} is reserved")]
    ReservedId(u64),

    /// Payload length does not fit the header
    #[error("Event payload of {0} bytes is too large")]
    PayloadTooLarge(usize),

    /// Buffer or table growth failed
    #[error("Allocation failed: {0}")]
    Alloc(#[from] TryReserveError),
}
