//! Hot-reload support for module libraries
//!
//! Watches module directories and reports library files whose contents
//! changed, once the changes have settled for the debounce period. The
//! reload itself happens on the frame thread through
//! [`ModuleLoader::reload`](crate::ModuleLoader::reload).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::discovery::{is_module_candidate, DEFAULT_MODULE_PREFIX};
use crate::error::{ModuleError, Result};

/// Configuration for hot-reload
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Wait for file changes to settle this long before reporting
    pub debounce: Duration,
    /// Watch subdirectories too
    pub recursive: bool,
    /// File name prefix of module libraries
    pub prefix: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            recursive: true,
            prefix: DEFAULT_MODULE_PREFIX.to_string(),
        }
    }
}

/// Watches module directories for changed libraries
pub struct ModuleWatcher {
    config: WatchConfig,
    /// The file watcher
    watcher: Option<RecommendedWatcher>,
    /// Receiver for file events
    events: Option<Receiver<notify::Result<Event>>>,
    /// Pending reloads (path -> time of the latest change)
    pending: HashMap<PathBuf, Instant>,
}

impl ModuleWatcher {
    /// Start watching `dirs`; directories that do not exist are skipped
    pub fn new(dirs: &[PathBuf], config: WatchConfig) -> Result<Self> {
        let (tx, rx) = unbounded();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| ModuleError::Watch(e.to_string()))?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for dir in dirs {
            if !dir.is_dir() {
                log::warn!("Not watching missing module directory {}", dir.display());
                continue;
            }
            watcher
                .watch(dir, mode)
                .map_err(|e| ModuleError::Watch(format!("{}: {}", dir.display(), e)))?;
            log::debug!("Watching {} for module changes", dir.display());
        }

        Ok(Self {
            config,
            watcher: Some(watcher),
            events: Some(rx),
            pending: HashMap::new(),
        })
    }

    /// Create a disabled watcher (for testing and headless runs)
    pub fn disabled() -> Self {
        Self {
            config: WatchConfig::default(),
            watcher: None,
            events: None,
            pending: HashMap::new(),
        }
    }

    /// Check if hot-reload is enabled
    pub fn is_enabled(&self) -> bool {
        self.watcher.is_some()
    }

    /// Queue a path as changed, as if the watcher had seen it
    pub fn trigger(&mut self, path: impl Into<PathBuf>) {
        self.pending.insert(path.into(), Instant::now());
    }

    /// Set the debounce period
    pub fn set_debounce(&mut self, debounce: Duration) {
        self.config.debounce = debounce;
    }

    /// Drain file events and return paths whose changes have settled
    pub fn poll(&mut self) -> Vec<PathBuf> {
        if let Some(rx) = &self.events {
            let events: Vec<_> = rx.try_iter().collect();
            for result in events {
                match result {
                    Ok(event) => self.handle_event(&event),
                    Err(e) => log::warn!("File watcher error: {}", e),
                }
            }
        }

        self.take_settled(Instant::now())
    }

    fn handle_event(&mut self, event: &Event) {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        for path in &event.paths {
            if is_module_candidate(path, &self.config.prefix) {
                log::debug!("Detected change in module library: {}", path.display());
                self.pending.insert(path.clone(), Instant::now());
            }
        }
    }

    fn take_settled(&mut self, now: Instant) -> Vec<PathBuf> {
        let debounce = self.config.debounce;
        let mut ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, changed)| now.duration_since(**changed) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.pending.remove(path);
        }
        ready.sort();
        ready
    }

    /// Paths waiting for the debounce period
    pub fn pending(&self) -> Vec<&Path> {
        self.pending.keys().map(PathBuf::as_path).collect()
    }
}

impl Drop for ModuleWatcher {
    fn drop(&mut self) {
        if self.is_enabled() {
            log::debug!("Shutting down module watcher");
        }
    }
}
