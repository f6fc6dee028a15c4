//! Dynamic library loading for modules
//!
//! Handles loading, entry point resolution, and unloading of module shared
//! libraries.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::abi::{GetModuleApiFn, MODULE_ENTRY_SYMBOL};
use crate::error::{ModuleError, Result};

/// A loaded module shared library
pub struct DynamicLibrary {
    /// Entry function, valid while `library` is loaded
    entry: GetModuleApiFn,
    path: PathBuf,
    /// Keeps the code behind `entry` mapped
    _library: Library,
}

impl DynamicLibrary {
    /// Load a module library and resolve its entry function
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Safety: running a library's initializers is inherent to loading
        // modules; only libraries built for this host belong in module dirs
        let library = unsafe { Library::new(path).map_err(|e| ModuleError::load_error(path, e.to_string()))? };

        let entry: GetModuleApiFn = unsafe {
            let symbol: Symbol<GetModuleApiFn> = library
                .get(MODULE_ENTRY_SYMBOL.as_bytes())
                .map_err(|_| ModuleError::symbol_not_found(path.display().to_string(), MODULE_ENTRY_SYMBOL))?;
            *symbol
        };

        log::debug!("Loaded module library '{}'", path.display());

        Ok(Self {
            entry,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    /// The library's entry function
    ///
    /// Only valid while this library is alive.
    pub fn entry(&self) -> GetModuleApiFn {
        self.entry
    }

    /// Get the library path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DynamicLibrary {
    fn drop(&mut self) {
        log::debug!("Unloading module library '{}'", self.path.display());
        // Library is automatically unloaded when dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_library() {
        let err = match DynamicLibrary::load("/nonexistent/module_missing.so") {
            Err(e) => e,
            Ok(_) => panic!("loading a missing library succeeded"),
        };
        match err {
            ModuleError::LoadError { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/module_missing.so"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
