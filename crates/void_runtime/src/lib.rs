//! # void_runtime - Module Host
//!
//! Hosts modules for the lifetime of the process:
//! - Loads module libraries from configured directories
//! - Runs the init passes and the per-frame lifecycle
//! - Publishes frame events on the kernel bus
//! - Reloads libraries that change on disk
//!
//! ```
//! use void_module::{MemoryImageLoader, Module, ModuleContext, Result};
//! use void_runtime::{kernel, Runtime, RuntimeConfig};
//!
//! struct Ticker;
//!
//! impl Module for Ticker {
//!     fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
//!         ctx.events.connect(kernel::KERNEL_BUS, kernel::KERNEL_UPDATE_EVENT, kernel::GAME_ORDER, |_, event| {
//!             let frame = event.read::<kernel::FrameEvent>().unwrap();
//!             assert!(frame.dt <= 0.1);
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! let mut config = RuntimeConfig::default();
//! config.modules.dirs.clear();
//! config.hot_reload.enabled = false;
//!
//! let mut runtime = Runtime::new(config, MemoryImageLoader::new())?;
//! runtime.add_static("ticker", Box::new(Ticker))?;
//! runtime.start()?;
//! runtime.step(1.0 / 60.0)?;
//! runtime.shutdown();
//! # Ok::<(), void_runtime::RuntimeError>(())
//! ```

pub mod boot_config;
pub mod error;
pub mod kernel;
pub mod runtime;

pub use boot_config::{ConfigError, FrameConfig, HotReloadConfig, ModulesConfig, RuntimeConfig};
pub use error::{Result, RuntimeError};
pub use kernel::{FrameEvent, KernelApi, LogApi};
pub use runtime::{Runtime, RuntimeState};
