//! Error types for the module system

use std::collections::TryReserveError;
use std::path::PathBuf;
use thiserror::Error;
use void_core::HandleError;
use void_event::EventError;

/// Result type for module operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors that can occur while loading, running or reloading modules
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Failed to load a module image
    #[error("Failed to load module '{path}': {message}")]
    LoadError { path: PathBuf, message: String },

    /// Library does not export a required symbol
    #[error("Symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    /// Library was built against a different module ABI
    #[error("Module '{path}' has ABI version {found}, expected {expected}")]
    AbiMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// The module table is full
    /// Name hash collides with a key the registries reserve
    #[error("Name hash {0:#018x} is reserved")]
    ReservedId(u64),

    #[error("Module capacity of {0} exhausted")]
    CapacityExhausted(usize),

    /// A module with this path is already loaded
    #[error("Module '{0}' is already loaded")]
    AlreadyLoaded(PathBuf),

    /// A module failed during one of its init passes
    #[error("Module '{module}' failed to initialize: {message}")]
    InitFailed { module: String, message: String },

    /// A module could not be brought back after a reload
    #[error("Module '{module}' failed to reload: {message}")]
    ReloadFailed { module: String, message: String },

    /// Module has no backing file to reload from
    #[error("Module '{0}' is static and cannot be reloaded")]
    NotReloadable(String),

    /// Module not found by name or path
    #[error("Module '{0}' not found")]
    NotFound(String),

    /// Module id no longer refers to a loaded module
    #[error("Stale module id: {0}")]
    StaleModule(#[from] HandleError),

    /// Error reported by a module callback
    #[error("{0}")]
    Module(String),

    /// Console variable missing or of the wrong type
    #[error("CVar '{name}': {message}")]
    CVar { name: String, message: String },

    /// Event system error
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watch(String),

    /// Reload state could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Table growth failed
    #[error("Allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModuleError {
    /// Create a load error
    pub fn load_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ModuleError::LoadError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symbol not found error
    pub fn symbol_not_found(library: impl Into<String>, symbol: impl Into<String>) -> Self {
        ModuleError::SymbolNotFound {
            library: library.into(),
            symbol: symbol.into(),
        }
    }

    /// Create an init failure
    pub fn init_failed(module: impl Into<String>, message: impl ToString) -> Self {
        ModuleError::InitFailed {
            module: module.into(),
            message: message.to_string(),
        }
    }

    /// Create a reload failure
    pub fn reload_failed(module: impl Into<String>, message: impl ToString) -> Self {
        ModuleError::ReloadFailed {
            module: module.into(),
            message: message.to_string(),
        }
    }

    /// Error raised from inside a module callback
    pub fn module(message: impl Into<String>) -> Self {
        ModuleError::Module(message.into())
    }

    /// Create a cvar error
    pub fn cvar(name: impl Into<String>, message: impl Into<String>) -> Self {
        ModuleError::CVar {
            name: name.into(),
            message: message.into(),
        }
    }
}
