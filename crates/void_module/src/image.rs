//! Module images and the loaders that produce them
//!
//! An image is one loaded copy of a module: the module object plus whatever
//! code backs it. [`DylibImageLoader`] reads shared libraries from disk;
//! [`MemoryImageLoader`] serves modules compiled into the host, keyed by the
//! same paths, which is how embedders and tests drive the loader without
//! building libraries.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::abi::{resolve_vtable, GetModuleApiFn, VTableModule};
use crate::error::{ModuleError, Result};
use crate::library::DynamicLibrary;
use crate::module::Module;

/// A loaded module and the code behind it
///
/// Fields drop in declaration order, so the module is gone before its
/// library is unloaded.
pub struct ModuleImage {
    module: Box<dyn Module>,
    entry: Option<GetModuleApiFn>,
    library: Option<DynamicLibrary>,
}

impl ModuleImage {
    /// An image with no entry function
    pub fn new(module: Box<dyn Module>) -> Self {
        Self {
            module,
            entry: None,
            library: None,
        }
    }

    /// An image backed by an entry function compiled into the host
    pub fn from_entry(entry: GetModuleApiFn, path: &Path) -> Result<Self> {
        // Safety: host code is never unloaded
        let vtable = unsafe { resolve_vtable(entry, path)? };
        Ok(Self {
            module: Box::new(VTableModule::new(vtable)),
            entry: Some(entry),
            library: None,
        })
    }

    /// An image backed by a shared library
    pub fn from_library(library: DynamicLibrary) -> Result<Self> {
        // Safety: the library is stored next to the module and outlives it
        let vtable = unsafe { resolve_vtable(library.entry(), library.path())? };
        Ok(Self {
            module: Box::new(VTableModule::new(vtable)),
            entry: Some(library.entry()),
            library: Some(library),
        })
    }

    pub fn module_mut(&mut self) -> &mut dyn Module {
        self.module.as_mut()
    }

    /// Whether a shared library backs this image
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }

    /// Ask the image's entry function for an export
    pub fn query(&self, api_id: u64) -> Option<*const c_void> {
        let entry = self.entry?;
        let ptr = unsafe { entry(api_id) };
        (!ptr.is_null()).then_some(ptr)
    }
}

/// Produces module images from paths
pub trait ImageLoader: Send {
    fn load(&self, path: &Path) -> Result<ModuleImage>;
}

/// Loads images from shared libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibImageLoader;

impl ImageLoader for DylibImageLoader {
    fn load(&self, path: &Path) -> Result<ModuleImage> {
        ModuleImage::from_library(DynamicLibrary::load(path)?)
    }
}

/// Creates a fresh module object for each load
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

#[derive(Clone)]
enum MemoryImage {
    Factory(ModuleFactory),
    Entry(GetModuleApiFn),
}

/// Serves in-process modules by path
///
/// Clones share the same table, so a test can keep one handle and swap the
/// image behind a path while the loader owns another.
#[derive(Clone, Default)]
pub struct MemoryImageLoader {
    images: Arc<RwLock<HashMap<PathBuf, MemoryImage>>>,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve modules built by `factory` at `path`, replacing any previous image
    pub fn insert<F>(&self, path: impl Into<PathBuf>, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.images
            .write()
            .insert(path.into(), MemoryImage::Factory(Arc::new(factory)));
    }

    /// Serve a module through an entry function, as a library would
    pub fn insert_entry(&self, path: impl Into<PathBuf>, entry: GetModuleApiFn) {
        self.images.write().insert(path.into(), MemoryImage::Entry(entry));
    }

    /// Stop serving `path`
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.images.write().remove(path.as_ref()).is_some()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.images.read().contains_key(path.as_ref())
    }
}

impl ImageLoader for MemoryImageLoader {
    fn load(&self, path: &Path) -> Result<ModuleImage> {
        let image = self
            .images
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| ModuleError::load_error(path, "no such image"))?;

        match image {
            MemoryImage::Factory(factory) => Ok(ModuleImage::new(factory())),
            MemoryImage::Entry(entry) => ModuleImage::from_entry(entry, path),
        }
    }
}
