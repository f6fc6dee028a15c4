//! # void_structures - Runtime Containers
//!
//! Containers shared by the module runtime:
//! - IdMap: open-addressing `u64 -> u64` table with tombstone removal, used
//!   for name-hash lookups in the API registry, the event hub and the cvar
//!   registry

pub mod id_map;

pub use id_map::IdMap;

pub mod prelude {
    pub use crate::id_map::IdMap;
}
