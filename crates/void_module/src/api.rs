//! API registry
//!
//! Modules publish capability tables under a versioned name such as
//! `"void_log_a0"` and other modules look them up by the same name. Several
//! implementations may share a name; they are kept in registration order and
//! walked with a cursor or an iterator.
//!
//! A table can be any `Send + Sync` value. Trait objects are registered
//! wrapped in an `Arc`:
//!
//! ```
//! use std::sync::Arc;
//! use void_module::ApiRegistry;
//!
//! trait LogApi: Send + Sync {
//!     fn log(&self, msg: &str) -> usize;
//! }
//!
//! struct Stdout;
//! impl LogApi for Stdout {
//!     fn log(&self, msg: &str) -> usize { msg.len() }
//! }
//!
//! let mut apis = ApiRegistry::new();
//! let log: Arc<dyn LogApi> = Arc::new(Stdout);
//! apis.register_api("void_log_a0", log).unwrap();
//!
//! let log = apis.get::<Arc<dyn LogApi>>("void_log_a0").unwrap();
//! assert_eq!(log.log("hi"), 2);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use void_core::id64;
use void_structures::id_map::{EMPTY, TOMBSTONE};
use void_structures::IdMap;

use crate::error::{ModuleError, Result};

/// Type-erased capability table
pub type AnyApi = Arc<dyn Any + Send + Sync>;

/// Reject name hashes that collide with the map's reserved keys
pub(crate) fn check_name_hash(name_hash: u64) -> Result<()> {
    if name_hash == EMPTY || name_hash == TOMBSTONE {
        return Err(ModuleError::ReservedId(name_hash));
    }
    Ok(())
}

/// One registration of an API
#[derive(Clone)]
pub struct ApiEntry {
    name_hash: u64,
    api: AnyApi,
    owner: Option<u64>,
}

impl ApiEntry {
    /// Hash of the name this entry was registered under
    pub fn name_hash(&self) -> u64 {
        self.name_hash
    }

    /// The module that registered the entry, if any
    pub fn owner(&self) -> Option<u64> {
        self.owner
    }

    /// The type-erased table
    pub fn api(&self) -> &AnyApi {
        &self.api
    }

    /// Downcast the table
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.api.downcast_ref::<T>()
    }

    /// Check if two entries are the same registration
    pub fn ptr_eq(&self, other: &ApiEntry) -> bool {
        Arc::ptr_eq(&self.api, &other.api)
    }
}

impl fmt::Debug for ApiEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiEntry")
            .field("name_hash", &format_args!("{:#018x}", self.name_hash))
            .field("owner", &self.owner)
            .finish()
    }
}

/// Position in a chain of implementations; see [`ApiRegistry::first`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiCursor {
    pos: Option<(usize, usize)>,
}

impl ApiCursor {
    const END: ApiCursor = ApiCursor { pos: None };

    /// Check if the cursor is past the last implementation
    pub fn is_end(&self) -> bool {
        self.pos.is_none()
    }
}

/// Registry of named capability tables
#[derive(Default)]
pub struct ApiRegistry {
    /// name hash -> index into `chains`
    index: IdMap,
    chains: Vec<Vec<ApiEntry>>,
    owner: Option<u64>,
}

impl ApiRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owner recorded on subsequent registrations
    pub fn set_owner(&mut self, owner: Option<u64>) -> Option<u64> {
        std::mem::replace(&mut self.owner, owner)
    }

    /// Current owner
    pub fn owner(&self) -> Option<u64> {
        self.owner
    }

    fn chain(&self, name_hash: u64) -> &[ApiEntry] {
        match self.index.get(name_hash) {
            Some(idx) => &self.chains[idx as usize],
            None => &[],
        }
    }

    /// Register `api` under `name`
    ///
    /// Never deduplicates: registering the same name twice leaves two
    /// implementations, iterated oldest first.
    pub fn register_api<T: Any + Send + Sync>(&mut self, name: &str, api: T) -> Result<ApiEntry> {
        self.register_any(id64(name), Arc::new(api))
    }

    /// Register an already type-erased table under a name hash
    pub fn register_any(&mut self, name_hash: u64, api: AnyApi) -> Result<ApiEntry> {
        check_name_hash(name_hash)?;
        let idx = match self.index.get(name_hash) {
            Some(idx) => idx as usize,
            None => {
                let idx = self.chains.len();
                self.index.insert(name_hash, idx as u64)?;
                self.chains.push(Vec::new());
                idx
            }
        };

        let entry = ApiEntry {
            name_hash,
            api,
            owner: self.owner,
        };
        self.chains[idx].push(entry.clone());
        log::debug!("Registered API {:#018x} (owner {:?})", name_hash, self.owner);
        Ok(entry)
    }

    /// Cursor at the first implementation of `name`
    pub fn first(&self, name: &str) -> ApiCursor {
        self.first_by_hash(id64(name))
    }

    /// Cursor at the first implementation registered under a name hash
    pub fn first_by_hash(&self, name_hash: u64) -> ApiCursor {
        match self.index.get(name_hash) {
            Some(chain) if !self.chains[chain as usize].is_empty() => ApiCursor {
                pos: Some((chain as usize, 0)),
            },
            _ => ApiCursor::END,
        }
    }

    /// Advance a cursor to the next implementation of the same name
    pub fn next(&self, cursor: ApiCursor) -> ApiCursor {
        match cursor.pos {
            Some((chain, pos)) if pos + 1 < self.chains.get(chain).map_or(0, Vec::len) => ApiCursor {
                pos: Some((chain, pos + 1)),
            },
            _ => ApiCursor::END,
        }
    }

    /// The entry a cursor points at
    pub fn entry(&self, cursor: ApiCursor) -> Option<&ApiEntry> {
        let (chain, pos) = cursor.pos?;
        self.chains.get(chain)?.get(pos)
    }

    /// All implementations of `name`, oldest first
    pub fn iter(&self, name: &str) -> impl Iterator<Item = &ApiEntry> + '_ {
        self.chain(id64(name)).iter()
    }

    /// All implementations of `name` that are a `T`
    pub fn iter_as<T: Any>(&self, name: &str) -> impl Iterator<Item = &T> + '_ {
        self.iter(name).filter_map(ApiEntry::downcast_ref::<T>)
    }

    /// First implementation of `name`, downcast to `T`
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.iter_as::<T>(name).next()
    }

    /// First implementation of `name` as a shared pointer
    pub fn get_arc<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.iter(name)
            .find_map(|entry| Arc::clone(&entry.api).downcast::<T>().ok())
    }

    /// Number of implementations of `name`
    pub fn count(&self, name: &str) -> usize {
        self.chain(id64(name)).len()
    }

    /// Check if `name` has at least one implementation
    pub fn contains(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    /// Remove one registration, matched by identity
    pub fn unregister(&mut self, entry: &ApiEntry) -> bool {
        for chain in &mut self.chains {
            if let Some(pos) = chain.iter().position(|e| e.ptr_eq(entry)) {
                chain.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove every registration made while `owner` was current
    pub fn unregister_owner(&mut self, owner: u64) -> usize {
        let mut removed = 0;
        for chain in &mut self.chains {
            let before = chain.len();
            chain.retain(|e| e.owner != Some(owner));
            removed += before - chain.len();
        }
        if removed > 0 {
            log::debug!("Unregistered {} APIs of owner {:#x}", removed, owner);
        }
        removed
    }

    /// Total number of registrations
    pub fn len(&self) -> usize {
        self.chains.iter().map(Vec::len).sum()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRegistry")
            .field("names", &self.chains.len())
            .field("registrations", &self.len())
            .finish()
    }
}
