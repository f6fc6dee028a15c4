//! Runtime - owns the module substrate and drives frames
//!
//! Holds the API registry, event hub, console variables and module loader,
//! and runs the frame lifecycle on top of them:
//!
//! 1. module `update`
//! 2. `KERNEL_UPDATE_EVENT` on the kernel bus
//! 3. module `after_update`
//! 4. `KERNEL_POST_UPDATE_EVENT` on the kernel bus
//! 5. every other bus

use std::path::Path;
use std::sync::Arc;

use void_event::EventHub;
use void_module::{
    ApiRegistry, CVarRegistry, FsDirectoryLister, ImageLoader, Module, ModuleContext, ModuleId,
    ModuleLoader,
};
#[cfg(feature = "hot-reload")]
use void_module::ModuleWatcher;

use crate::boot_config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::kernel::{
    FrameEvent, KernelApi, LogApi, KERNEL_API_NAME, KERNEL_BUS, KERNEL_INIT_EVENT,
    KERNEL_POST_UPDATE_EVENT, KERNEL_QUIT_EVENT, KERNEL_SHUTDOWN_EVENT, KERNEL_UPDATE_EVENT,
    LOG_API_NAME,
};

/// Lifecycle of the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Modules may be added; nothing is initialized
    Created,
    /// Frames are running
    Running,
    /// Modules are shut down
    Stopped,
}

/// The module runtime
pub struct Runtime {
    config: RuntimeConfig,
    apis: ApiRegistry,
    events: EventHub,
    cvars: CVarRegistry,
    loader: ModuleLoader,
    kernel: Arc<KernelApi>,
    #[cfg(feature = "hot-reload")]
    watcher: ModuleWatcher,
    state: RuntimeState,
    frame: u64,
    quit_sent: bool,
}

impl Runtime {
    /// Create a runtime that loads module images through `images`
    pub fn new(config: RuntimeConfig, images: impl ImageLoader + 'static) -> Result<Self> {
        log::info!("Creating runtime...");

        let mut events = EventHub::new();
        events.create_bus(KERNEL_BUS)?;

        let kernel = Arc::new(KernelApi::default());
        let mut apis = ApiRegistry::new();
        apis.register_api(KERNEL_API_NAME, Arc::clone(&kernel))?;
        apis.register_api(LOG_API_NAME, LogApi::current())?;

        let loader = ModuleLoader::new(config.loader_config(), images);

        #[cfg(feature = "hot-reload")]
        let watcher = Self::create_watcher(&config);

        Ok(Self {
            config,
            apis,
            events,
            cvars: CVarRegistry::new(),
            loader,
            kernel,
            #[cfg(feature = "hot-reload")]
            watcher,
            state: RuntimeState::Created,
            frame: 0,
            quit_sent: false,
        })
    }

    #[cfg(feature = "hot-reload")]
    fn create_watcher(config: &RuntimeConfig) -> ModuleWatcher {
        if !config.hot_reload.enabled {
            return ModuleWatcher::disabled();
        }
        match ModuleWatcher::new(&config.modules.dirs, config.watch_config()) {
            Ok(watcher) => {
                log::info!("Hot reload enabled");
                watcher
            }
            Err(e) => {
                log::warn!("Failed to start module watcher, hot reload disabled: {}", e);
                ModuleWatcher::disabled()
            }
        }
    }

    /// Split the loader from the services its callbacks receive
    fn parts(&mut self) -> (&mut ModuleLoader, ModuleContext<'_>) {
        (
            &mut self.loader,
            ModuleContext::new(&mut self.apis, &mut self.events, &mut self.cvars),
        )
    }

    /// Add a module compiled into the host
    ///
    /// Once running, the module is initialized immediately and removed again
    /// if that fails.
    pub fn add_static(&mut self, name: &str, module: Box<dyn Module>) -> Result<ModuleId> {
        let id = self.loader.add_static(name, module)?;
        if self.state == RuntimeState::Running {
            self.start_module(id)?;
        }
        Ok(id)
    }

    /// Load every module named by the configuration
    ///
    /// Missing directories and libraries that fail to load are logged and
    /// skipped. Once running, each new module is started on its own and one
    /// that fails to start is dropped. Returns the number of modules added.
    pub fn load_modules(&mut self) -> Result<usize> {
        let mut added = Vec::new();

        let dirs = self.config.modules.dirs.clone();
        for dir in &dirs {
            if !dir.is_dir() {
                log::warn!("Module directory {} does not exist", dir.display());
                continue;
            }
            added.extend(
                self.loader
                    .load_dir(dir, &FsDirectoryLister, self.config.modules.recursive)?,
            );
        }

        let paths = self.config.modules.paths.clone();
        for path in &paths {
            if let Ok(id) = self.loader.load(path) {
                added.push(id);
            }
        }

        if self.state != RuntimeState::Running {
            return Ok(added.len());
        }

        let mut started = 0;
        for id in added {
            match self.start_module(id) {
                Ok(()) => started += 1,
                Err(e) => log::error!("Dropped module that failed to start: {}", e),
            }
        }
        Ok(started)
    }

    /// Initialize one module after startup; a failing module is removed
    fn start_module(&mut self, id: ModuleId) -> Result<()> {
        let (loader, mut ctx) = self.parts();
        loader.start_module(id, &mut ctx)?;
        self.cvars.apply_overrides(&self.config.cvars);
        Ok(())
    }

    /// Initialize every module, apply cvar overrides and announce the start
    /// on the kernel bus
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            RuntimeState::Created => {}
            RuntimeState::Running => return Err(RuntimeError::AlreadyStarted),
            RuntimeState::Stopped => return Err(RuntimeError::NotRunning),
        }

        let (loader, mut ctx) = self.parts();
        loader.init_all(&mut ctx)?;
        self.cvars.apply_overrides(&self.config.cvars);
        self.state = RuntimeState::Running;

        self.events.publish(KERNEL_BUS, KERNEL_INIT_EVENT, &[])?;
        self.events.dispatch(KERNEL_BUS)?;

        log::info!("Runtime started with {} modules", self.loader.len());
        Ok(())
    }

    /// Run one frame
    ///
    /// `dt` is clamped to `[0, frame.max_delta]`.
    pub fn step(&mut self, dt: f32) -> Result<()> {
        if self.state != RuntimeState::Running {
            return Err(RuntimeError::NotRunning);
        }

        let dt = if dt.is_finite() {
            dt.max(0.0).min(self.config.frame.max_delta)
        } else {
            0.0
        };
        self.frame += 1;
        self.kernel.set_frame(self.frame);
        let frame = FrameEvent::new(self.frame, dt);

        {
            let (loader, mut ctx) = self.parts();
            loader.update(&mut ctx, dt);
        }
        self.events.publish_pod(KERNEL_BUS, KERNEL_UPDATE_EVENT, &frame)?;
        self.events.dispatch(KERNEL_BUS)?;

        {
            let (loader, mut ctx) = self.parts();
            loader.after_update(&mut ctx, dt);
        }
        self.events.publish_pod(KERNEL_BUS, KERNEL_POST_UPDATE_EVENT, &frame)?;
        self.events.dispatch(KERNEL_BUS)?;

        self.events.dispatch_all();

        if self.kernel.quit_requested() && !self.quit_sent {
            log::info!("Quit requested at frame {}", self.frame);
            self.quit_sent = true;
            self.events.publish(KERNEL_BUS, KERNEL_QUIT_EVENT, &[])?;
            self.events.dispatch(KERNEL_BUS)?;
        }

        Ok(())
    }

    /// Reload the module loaded from `path`
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.state != RuntimeState::Running {
            return Err(RuntimeError::NotRunning);
        }
        let (loader, mut ctx) = self.parts();
        loader.reload(path, &mut ctx)?;
        Ok(())
    }

    /// Reload every reloadable module, returning how many were reloaded
    pub fn reload_all(&mut self) -> Result<usize> {
        if self.state != RuntimeState::Running {
            return Err(RuntimeError::NotRunning);
        }
        let (loader, mut ctx) = self.parts();
        Ok(loader.reload_all(&mut ctx)?)
    }

    /// Reload modules whose libraries changed on disk and start libraries
    /// that appeared since startup
    ///
    /// Returns the number of modules reloaded or started. Failures are
    /// logged.
    #[cfg(feature = "hot-reload")]
    pub fn poll_hot_reload(&mut self) -> usize {
        if self.state != RuntimeState::Running {
            return 0;
        }

        let mut handled = 0;
        for path in self.watcher.poll() {
            match self.find_loaded(&path) {
                Some(id) => {
                    let (loader, mut ctx) = self.parts();
                    match loader.reload_module(id, &mut ctx) {
                        Ok(()) => handled += 1,
                        Err(e) => log::error!("Hot reload of {} failed: {}", path.display(), e),
                    }
                }
                None => {
                    let (loader, mut ctx) = self.parts();
                    match loader.load_and_start(&path, &mut ctx) {
                        Ok(_) => {
                            self.cvars.apply_overrides(&self.config.cvars);
                            log::info!("Started new module {}", path.display());
                            handled += 1;
                        }
                        Err(e) => log::error!("Failed to start {}: {}", path.display(), e),
                    }
                }
            }
        }
        handled
    }

    /// Without the watcher there is nothing to poll
    #[cfg(not(feature = "hot-reload"))]
    pub fn poll_hot_reload(&mut self) -> usize {
        0
    }

    /// Module loaded from `path`, matching through symlinks and relative
    /// paths
    #[cfg(feature = "hot-reload")]
    fn find_loaded(&self, path: &Path) -> Option<ModuleId> {
        if let Some(id) = self.loader.find_by_path(path) {
            return Some(id);
        }
        let wanted = std::fs::canonicalize(path).ok()?;
        self.loader
            .iter()
            .find(|record| {
                record
                    .path()
                    .and_then(|p| std::fs::canonicalize(p).ok())
                    .is_some_and(|p| p == wanted)
            })
            .map(|record| record.id())
    }

    /// Stop after the current frame
    pub fn request_quit(&self) {
        self.kernel.request_quit();
    }

    pub fn is_running(&self) -> bool {
        self.state == RuntimeState::Running && !self.kernel.quit_requested()
    }

    /// Announce shutdown on the kernel bus, then shut modules down in
    /// reverse load order
    pub fn shutdown(&mut self) {
        if self.state == RuntimeState::Stopped {
            return;
        }

        if self.state == RuntimeState::Running {
            let announced = self
                .events
                .publish(KERNEL_BUS, KERNEL_SHUTDOWN_EVENT, &[])
                .and_then(|()| self.events.dispatch(KERNEL_BUS));
            if let Err(e) = announced {
                log::warn!("Failed to announce shutdown: {}", e);
            }
        }

        let (loader, mut ctx) = self.parts();
        loader.shutdown_all(&mut ctx);
        self.state = RuntimeState::Stopped;
        log::info!("Runtime stopped after {} frames", self.frame);
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Frames run so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn kernel(&self) -> &Arc<KernelApi> {
        &self.kernel
    }

    pub fn apis(&self) -> &ApiRegistry {
        &self.apis
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventHub {
        &mut self.events
    }

    pub fn cvars(&self) -> &CVarRegistry {
        &self.cvars
    }

    pub fn cvars_mut(&mut self) -> &mut CVarRegistry {
        &mut self.cvars
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// The module directory watcher
    #[cfg(feature = "hot-reload")]
    pub fn watcher_mut(&mut self) -> &mut ModuleWatcher {
        &mut self.watcher
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("state", &self.state)
            .field("frame", &self.frame)
            .field("modules", &self.loader.len())
            .field("apis", &self.apis.len())
            .finish()
    }
}
