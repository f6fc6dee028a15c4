//! # void_core - Void Runtime Core
//!
//! Small primitives every other crate of the module runtime builds on:
//! - **Name ids**: 64-bit FNV-1a hashes of API, event and bus names, usable
//!   in `const` context so ids can be declared next to the interface they name
//! - **Handles**: generation-counted integer handles with a quarantined free
//!   list, for identifiers handed out to callers that may keep stale copies
//!
//! Nothing here knows about modules or events; those live in `void_module`
//! and `void_event`.

pub mod error;
pub mod handle;
pub mod id;

pub use error::{HandleError, Result};
pub use handle::{Handle, HandleAllocator};
pub use id::id64;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{HandleError, Result};
    pub use crate::handle::{Handle, HandleAllocator};
    pub use crate::id::id64;
}
