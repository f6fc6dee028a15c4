//! # void_module - Module Runtime
//!
//! Loads units of functionality ("modules") at runtime, lets them publish and
//! find each other's APIs by name, and swaps their code while the process
//! keeps running.
//!
//! ## Features
//!
//! - **API registry**: named, versioned capability tables with multiple
//!   implementations per name
//! - **Lifecycle passes**: `init`, `init_api`, `init_cvar`, per-frame
//!   `update`/`after_update`, reverse-order `shutdown`
//! - **Hot reload**: state handed from the old image to the new one as bytes
//! - **Discovery**: loads every `module_*` library in a directory
//! - **Console variables**: typed settings registered by modules
//!
//! ## Writing a module
//!
//! ```
//! use void_module::{
//!     ApiRegistry, CVarRegistry, LoaderConfig, MemoryImageLoader, Module, ModuleContext,
//!     ModuleLoader, Result,
//! };
//! use void_event::EventHub;
//!
//! struct Clock {
//!     frames: u64,
//! }
//!
//! impl Module for Clock {
//!     fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
//!         ctx.apis.register_api("void_clock_a0", 60u32)?;
//!         Ok(())
//!     }
//!
//!     fn update(&mut self, _ctx: &mut ModuleContext<'_>, _dt: f32) {
//!         self.frames += 1;
//!     }
//! }
//!
//! let mut apis = ApiRegistry::new();
//! let mut events = EventHub::new();
//! let mut cvars = CVarRegistry::new();
//! let mut ctx = ModuleContext::new(&mut apis, &mut events, &mut cvars);
//!
//! let mut loader = ModuleLoader::new(LoaderConfig::default(), MemoryImageLoader::new());
//! loader.add_static("clock", Box::new(Clock { frames: 0 }))?;
//! loader.init_all(&mut ctx)?;
//! loader.update(&mut ctx, 1.0 / 60.0);
//! assert_eq!(ctx.apis.get::<u32>("void_clock_a0"), Some(&60));
//! loader.shutdown_all(&mut ctx);
//! # Ok::<(), void_module::ModuleError>(())
//! ```
//!
//! Shared-library modules export a [`ModuleVTable`] with [`export_module!`].

pub mod abi;
pub mod api;
pub mod cvar;
pub mod discovery;
pub mod error;
#[cfg(feature = "hot-reload")]
pub mod hot_reload;
pub mod image;
pub mod library;
pub mod loader;
pub mod module;

pub use abi::{GetModuleApiFn, ModuleVTable, VTableModule, MODULE_ABI_VERSION, MODULE_ENTRY_SYMBOL, MODULE_EXPORT_API_ID};
pub use api::{AnyApi, ApiCursor, ApiEntry, ApiRegistry};
pub use cvar::{CVar, CVarRegistry, CVarValue};
pub use discovery::{is_module_candidate, DirectoryLister, FsDirectoryLister, DEFAULT_MODULE_PREFIX};
pub use error::{ModuleError, Result};
#[cfg(feature = "hot-reload")]
pub use hot_reload::{ModuleWatcher, WatchConfig};
pub use image::{DylibImageLoader, ImageLoader, MemoryImageLoader, ModuleFactory, ModuleImage};
pub use library::DynamicLibrary;
pub use loader::{LoaderConfig, ModuleId, ModuleLoader, ModuleRecord, ModuleState};
pub use module::{Module, ModuleContext, ReloadState};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::api::ApiRegistry;
    pub use crate::cvar::CVarRegistry;
    pub use crate::error::{ModuleError, Result};
    pub use crate::loader::{ModuleId, ModuleLoader};
    pub use crate::module::{Module, ModuleContext, ReloadState};
}
