//! Module loader
//!
//! Owns every loaded module and drives it through its lifecycle:
//!
//! ```text
//! Unloaded -> Loaded -> Initialized -> Running -> ShuttingDown -> (removed)
//!                                        |   ^
//!                          reload_begin  v   |  reload_end
//!                                   ReloadPending
//! ```
//!
//! Modules run in registration order and shut down in reverse. While a
//! module callback runs, the API registry and the event hub record that
//! module as the owner of anything registered or connected, so the loader
//! can drop exactly those entries when the module unloads or reloads.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};

use void_core::{Handle, HandleAllocator};

use crate::discovery::{is_module_candidate, module_name, DirectoryLister, DEFAULT_MODULE_PREFIX};
use crate::error::{ModuleError, Result};
use crate::image::{ImageLoader, ModuleImage};
use crate::module::{Module, ModuleContext};

/// Identifies a loaded module; stays the same across reloads
pub type ModuleId = Handle<ModuleRecord>;

/// Lifecycle state of a module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleState {
    /// Reload failed; no image is loaded
    Unloaded,
    /// Image loaded, `init` not yet run
    Loaded,
    /// `init` succeeded, later passes pending
    Initialized,
    /// All init passes done; receives updates
    Running,
    /// Between `reload_begin` and `reload_end`
    ReloadPending,
    /// `shutdown` in progress
    ShuttingDown,
}

impl ModuleState {
    fn is_initialized(self) -> bool {
        matches!(self, ModuleState::Initialized | ModuleState::Running)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Loaded => "loaded",
            ModuleState::Initialized => "initialized",
            ModuleState::Running => "running",
            ModuleState::ReloadPending => "reload pending",
            ModuleState::ShuttingDown => "shutting down",
        };
        f.write_str(name)
    }
}

/// Loader settings
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Most modules loaded at once
    pub max_modules: usize,
    /// File name prefix for directory discovery
    pub prefix: String,
    /// Re-run `init_api` on other modules after a reload
    pub refresh_apis_on_reload: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_modules: 256,
            prefix: DEFAULT_MODULE_PREFIX.to_string(),
            refresh_apis_on_reload: true,
        }
    }
}

/// One loaded module
pub struct ModuleRecord {
    id: ModuleId,
    name: String,
    path: Option<PathBuf>,
    image: Option<ModuleImage>,
    state: ModuleState,
}

impl ModuleRecord {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the module was loaded from; `None` for static modules
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn is_static(&self) -> bool {
        self.path.is_none()
    }

    fn owner(&self) -> u64 {
        self.id.to_bits()
    }

    /// Run a callback on the module with the registry and hub owner set to it
    fn call<R>(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        f: impl FnOnce(&mut dyn Module, &mut ModuleContext<'_>) -> R,
    ) -> Option<R> {
        let owner = self.owner();
        let image = self.image.as_mut()?;
        let previous = ctx.set_owner(Some(owner));
        let result = f(image.module_mut(), ctx);
        ctx.set_owner(previous);
        Some(result)
    }

    /// Drop every API registration and event subscription the module made
    fn drop_registrations(&self, ctx: &mut ModuleContext<'_>) {
        ctx.apis.unregister_owner(self.owner());
        ctx.events.disconnect_owner(self.owner());
    }

    fn shutdown(&mut self, ctx: &mut ModuleContext<'_>) {
        if self.state.is_initialized() {
            self.state = ModuleState::ShuttingDown;
            log::debug!("Shutting down module '{}'", self.name);
            self.call(ctx, |module, ctx| module.shutdown(ctx));
        }
        self.drop_registrations(ctx);
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state)
            .finish()
    }
}

/// Loads modules and runs their lifecycle passes
pub struct ModuleLoader {
    config: LoaderConfig,
    images: Box<dyn ImageLoader>,
    records: Vec<ModuleRecord>,
    ids: HandleAllocator<ModuleRecord>,
}

impl ModuleLoader {
    /// Create a loader that resolves paths through `images`
    pub fn new(config: LoaderConfig, images: impl ImageLoader + 'static) -> Self {
        Self {
            config,
            images: Box::new(images),
            records: Vec::new(),
            ids: HandleAllocator::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn index_of(&self, id: ModuleId) -> Result<usize> {
        self.ids.validate(id)?;
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| ModuleError::NotFound(id.to_string()))
    }

    fn check_capacity(&self) -> Result<()> {
        if self.records.len() >= self.config.max_modules {
            log::error!("Module capacity of {} exhausted", self.config.max_modules);
            return Err(ModuleError::CapacityExhausted(self.config.max_modules));
        }
        Ok(())
    }

    fn push(&mut self, name: String, path: Option<PathBuf>, image: ModuleImage) -> ModuleId {
        let id = self.ids.create();
        self.records.push(ModuleRecord {
            id,
            name,
            path,
            image: Some(image),
            state: ModuleState::Loaded,
        });
        id
    }

    /// Load one module image from `path`
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<ModuleId> {
        let path = path.as_ref();
        if self.find_by_path(path).is_some() {
            return Err(ModuleError::AlreadyLoaded(path.to_path_buf()));
        }
        self.check_capacity()?;

        let image = self.images.load(path).map_err(|e| {
            log::error!("Failed to load module '{}': {}", path.display(), e);
            e
        })?;

        let name = module_name(path);
        log::info!("Loaded module '{}' from {}", name, path.display());
        Ok(self.push(name, Some(path.to_path_buf()), image))
    }

    /// Register a module compiled into the host
    pub fn add_static(&mut self, name: &str, module: Box<dyn Module>) -> Result<ModuleId> {
        self.check_capacity()?;
        log::info!("Added static module '{}'", name);
        Ok(self.push(name.to_string(), None, ModuleImage::new(module)))
    }

    /// Load every module library found under `dir`
    ///
    /// Candidates that fail to load are logged and skipped.
    pub fn load_dir(
        &mut self,
        dir: impl AsRef<Path>,
        lister: &dyn DirectoryLister,
        recursive: bool,
    ) -> Result<Vec<ModuleId>> {
        let dir = dir.as_ref();
        let files = lister.list(dir, recursive)?;

        let mut loaded = Vec::new();
        for path in files {
            if !is_module_candidate(&path, &self.config.prefix) {
                continue;
            }
            if let Ok(id) = self.load(&path) {
                loaded.push(id);
            }
        }

        log::info!("Loaded {} modules from {}", loaded.len(), dir.display());
        Ok(loaded)
    }

    /// Run the init passes on every module that has not been initialized
    ///
    /// If any module fails, modules initialized by this call are shut down
    /// in reverse order and the error is returned.
    pub fn init_all(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        let pending: Vec<usize> = (0..self.records.len())
            .filter(|&idx| self.records[idx].state == ModuleState::Loaded)
            .collect();
        self.run_init_passes(&pending, ctx)
    }

    /// Load a module after startup and initialize it immediately
    ///
    /// A module that fails to initialize is removed again.
    pub fn load_and_start(&mut self, path: impl AsRef<Path>, ctx: &mut ModuleContext<'_>) -> Result<ModuleId> {
        let id = self.load(path)?;
        self.start_module(id, ctx)?;
        Ok(id)
    }

    /// Run the init passes on a single loaded module
    ///
    /// Other pending modules are left alone. A module that fails to
    /// initialize is removed again; one already initialized is a no-op.
    pub fn start_module(&mut self, id: ModuleId, ctx: &mut ModuleContext<'_>) -> Result<()> {
        let idx = self.index_of(id)?;
        if self.records[idx].state != ModuleState::Loaded {
            return Ok(());
        }
        if let Err(e) = self.run_init_passes(&[idx], ctx) {
            self.records.remove(idx);
            self.ids.destroy(id);
            return Err(e);
        }
        Ok(())
    }

    fn run_init_passes(&mut self, indices: &[usize], ctx: &mut ModuleContext<'_>) -> Result<()> {
        let mut initialized = Vec::with_capacity(indices.len());

        for &idx in indices {
            let record = &mut self.records[idx];
            match record.call(ctx, |module, ctx| module.init(ctx)).unwrap_or(Ok(())) {
                Ok(()) => {
                    record.state = ModuleState::Initialized;
                    initialized.push(idx);
                    log::debug!("Initialized module '{}'", record.name);
                }
                Err(e) => {
                    let name = record.name.clone();
                    log::error!("Module '{}' failed to initialize: {}", name, e);
                    record.drop_registrations(ctx);
                    self.roll_back(&initialized, ctx);
                    return Err(ModuleError::init_failed(name, e));
                }
            }
        }

        for &idx in indices {
            let record = &mut self.records[idx];
            if let Some(Err(e)) = record.call(ctx, |module, ctx| module.init_api(ctx)) {
                let name = record.name.clone();
                log::error!("Module '{}' failed to resolve APIs: {}", name, e);
                self.roll_back(&initialized, ctx);
                return Err(ModuleError::init_failed(name, e));
            }
        }

        for &idx in indices {
            let record = &mut self.records[idx];
            if let Some(Err(e)) = record.call(ctx, |module, ctx| module.init_cvar(&mut *ctx.cvars)) {
                let name = record.name.clone();
                log::error!("Module '{}' failed to register cvars: {}", name, e);
                self.roll_back(&initialized, ctx);
                return Err(ModuleError::init_failed(name, e));
            }
        }

        for &idx in indices {
            self.records[idx].state = ModuleState::Running;
        }
        Ok(())
    }

    /// Shut down the given modules in reverse order, back to `Loaded`
    fn roll_back(&mut self, initialized: &[usize], ctx: &mut ModuleContext<'_>) {
        for &idx in initialized.iter().rev() {
            let record = &mut self.records[idx];
            record.shutdown(ctx);
            record.state = ModuleState::Loaded;
        }
    }

    /// Call `update` on every running module in registration order
    pub fn update(&mut self, ctx: &mut ModuleContext<'_>, dt: f32) {
        for record in &mut self.records {
            if record.state == ModuleState::Running {
                record.call(ctx, |module, ctx| module.update(ctx, dt));
            }
        }
    }

    /// Call `after_update` on every running module in registration order
    pub fn after_update(&mut self, ctx: &mut ModuleContext<'_>, dt: f32) {
        for record in &mut self.records {
            if record.state == ModuleState::Running {
                record.call(ctx, |module, ctx| module.after_update(ctx, dt));
            }
        }
    }

    /// Reload the module loaded from `path`
    pub fn reload(&mut self, path: impl AsRef<Path>, ctx: &mut ModuleContext<'_>) -> Result<()> {
        let path = path.as_ref();
        let id = self
            .find_by_path(path)
            .ok_or_else(|| ModuleError::NotFound(path.display().to_string()))?;
        self.reload_module(id, ctx)
    }

    /// Swap a module's image for a freshly loaded one from the same path
    ///
    /// State returned by `reload_begin` on the old image is handed to
    /// `reload_end` on the new one. If the new image cannot be loaded the
    /// module stays unloaded until a later reload succeeds.
    pub fn reload_module(&mut self, id: ModuleId, ctx: &mut ModuleContext<'_>) -> Result<()> {
        let idx = self.index_of(id)?;
        let record = &mut self.records[idx];
        let name = record.name.clone();
        let Some(path) = record.path.clone() else {
            return Err(ModuleError::NotReloadable(name));
        };
        log::info!("Reloading module '{}' from {}", name, path.display());

        let state = if record.state.is_initialized() {
            record.call(ctx, |module, ctx| module.reload_begin(ctx)).flatten()
        } else {
            None
        };
        record.state = ModuleState::ReloadPending;
        record.drop_registrations(ctx);
        record.image = None;

        let image = match self.images.load(&path) {
            Ok(image) => image,
            Err(e) => {
                record.state = ModuleState::Unloaded;
                log::error!("Module '{}' left unloaded after failed reload: {}", name, e);
                return Err(ModuleError::reload_failed(name, e));
            }
        };
        record.image = Some(image);
        record.state = ModuleState::Loaded;

        if let Some(Err(e)) = record.call(ctx, |module, ctx| module.reload_end(ctx, state)) {
            record.drop_registrations(ctx);
            log::error!("Module '{}' failed to restore after reload: {}", name, e);
            return Err(ModuleError::reload_failed(name, e));
        }
        record.state = ModuleState::Running;
        log::info!("Reloaded module '{}'", name);

        if self.config.refresh_apis_on_reload {
            self.refresh_apis(idx, ctx);
        }
        Ok(())
    }

    /// Re-run `init_api` on every running module except `skip`
    fn refresh_apis(&mut self, skip: usize, ctx: &mut ModuleContext<'_>) {
        for (idx, record) in self.records.iter_mut().enumerate() {
            if idx == skip || record.state != ModuleState::Running {
                continue;
            }
            if let Some(Err(e)) = record.call(ctx, |module, ctx| module.init_api(ctx)) {
                log::warn!("Module '{}' failed to refresh APIs: {}", record.name, e);
            }
        }
    }

    /// Reload every module that has a backing file, returning how many
    /// succeeded
    ///
    /// Every module is attempted; the first failure is returned afterwards.
    pub fn reload_all(&mut self, ctx: &mut ModuleContext<'_>) -> Result<usize> {
        let ids: Vec<ModuleId> = self
            .records
            .iter()
            .filter(|r| !r.is_static())
            .map(|r| r.id)
            .collect();

        let mut reloaded = 0;
        let mut first_error = None;
        for id in ids {
            match self.reload_module(id, ctx) {
                Ok(()) => reloaded += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reloaded),
        }
    }

    /// Shut down and remove one module
    pub fn unload(&mut self, id: ModuleId, ctx: &mut ModuleContext<'_>) -> Result<()> {
        let idx = self.index_of(id)?;
        let mut record = self.records.remove(idx);
        record.shutdown(ctx);
        self.ids.destroy(id);
        log::info!("Unloaded module '{}'", record.name);
        Ok(())
    }

    /// Shut down every module in reverse registration order and clear the
    /// table
    pub fn shutdown_all(&mut self, ctx: &mut ModuleContext<'_>) {
        while let Some(mut record) = self.records.pop() {
            record.shutdown(ctx);
            self.ids.destroy(record.id);
            log::info!("Unloaded module '{}'", record.name);
        }
    }

    /// Ask every module's entry function for an export, first match wins
    pub fn find_export(&self, api_id: u64) -> Option<*const c_void> {
        self.records
            .iter()
            .filter_map(|r| r.image.as_ref()?.query(api_id))
            .next()
    }

    /// Look up a module
    pub fn get(&self, id: ModuleId) -> Option<&ModuleRecord> {
        let idx = self.index_of(id).ok()?;
        Some(&self.records[idx])
    }

    pub fn state(&self, id: ModuleId) -> Option<ModuleState> {
        self.get(id).map(ModuleRecord::state)
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.get(id).is_some()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ModuleId> {
        self.records.iter().find(|r| r.name == name).map(|r| r.id)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<ModuleId> {
        self.records
            .iter()
            .find(|r| r.path.as_deref() == Some(path))
            .map(|r| r.id)
    }

    /// Modules in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.iter()
    }

    /// Paths of every file-backed module
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.iter().filter_map(ModuleRecord::path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("config", &self.config)
            .field("modules", &self.records)
            .finish()
    }
}
