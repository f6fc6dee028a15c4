//! Boot Configuration
//!
//! Settings read once at startup: where modules live, how hot reload
//! behaves, frame pacing, and overrides for console variables.
//!
//! # Configuration Sources (in priority order)
//!
//! 1. First command line argument: `void my_game.toml`
//! 2. Environment variable: `VOID_CONFIG=/etc/void/void.toml`
//! 3. `void.toml` in the working directory
//! 4. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! [modules]
//! dirs = ["./modules"]
//! paths = []
//! prefix = "module_"
//! max_modules = 256
//! recursive = true
//!
//! [hot_reload]
//! enabled = true
//! debounce_ms = 500
//!
//! [frame]
//! target_fps = 60
//! max_delta = 0.1
//!
//! [cvars]
//! "renderer.width" = 1280
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use void_module::{LoaderConfig, DEFAULT_MODULE_PREFIX};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "VOID_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "void.toml";

/// Config loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where to find modules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Directories scanned for module libraries
    pub dirs: Vec<PathBuf>,
    /// Libraries loaded by exact path
    pub paths: Vec<PathBuf>,
    /// File name prefix that marks a library as a module
    pub prefix: String,
    /// Most modules loaded at once
    pub max_modules: usize,
    /// Scan subdirectories
    pub recursive: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            dirs: vec![PathBuf::from("./modules")],
            paths: Vec::new(),
            prefix: DEFAULT_MODULE_PREFIX.to_string(),
            max_modules: 256,
            recursive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    pub enabled: bool,
    /// Quiet period before a changed library is reloaded
    pub debounce_ms: u64,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub target_fps: u32,
    /// Longest frame step in seconds; longer frames are clamped
    pub max_delta: f32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_delta: 0.1,
        }
    }
}

impl FrameConfig {
    /// Time budget of one frame
    pub fn target_frame_time(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub modules: ModulesConfig,
    pub hot_reload: HotReloadConfig,
    pub frame: FrameConfig,
    /// Values applied to registered console variables after startup
    pub cvars: toml::Table,

    /// Path the config was loaded from
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Load configuration from the command line, environment, or working
    /// directory, in that order
    pub fn load() -> Result<Self, ConfigError> {
        let arg = std::env::args().nth(1).filter(|a| !a.starts_with('-'));
        let env = std::env::var(CONFIG_ENV).ok();
        Self::load_from(arg.as_deref(), env.as_deref())
    }

    /// Resolve the config source from an explicit argument and environment
    /// value
    ///
    /// An explicitly named file must exist; a missing `void.toml` falls back
    /// to defaults.
    pub fn load_from(arg: Option<&str>, env: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(path) = arg {
            log::info!("Config from args: {}", path);
            return Self::load_from_file(path);
        }

        if let Some(path) = env {
            log::info!("Config from {}: {}", CONFIG_ENV, path);
            return Self::load_from_file(path);
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::load_from_file(DEFAULT_CONFIG_FILE);
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        config.config_path = Some(path.to_path_buf());

        log::info!("Loaded boot config from {}", path.display());
        Ok(config)
    }

    /// Parse a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.modules.max_modules == 0 {
            return Err(ConfigError::Invalid("modules.max_modules must be at least 1".into()));
        }
        if self.modules.prefix.is_empty() {
            return Err(ConfigError::Invalid("modules.prefix must not be empty".into()));
        }
        if self.frame.max_delta.is_nan() || self.frame.max_delta <= 0.0 {
            return Err(ConfigError::Invalid("frame.max_delta must be positive".into()));
        }
        Ok(())
    }

    /// Settings for the module loader
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            max_modules: self.modules.max_modules,
            prefix: self.modules.prefix.clone(),
            ..LoaderConfig::default()
        }
    }

    /// Settings for the module directory watcher
    #[cfg(feature = "hot-reload")]
    pub fn watch_config(&self) -> void_module::WatchConfig {
        void_module::WatchConfig {
            debounce: Duration::from_millis(self.hot_reload.debounce_ms),
            recursive: self.modules.recursive,
            prefix: self.modules.prefix.clone(),
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        log::info!("Boot Configuration:");
        for dir in &self.modules.dirs {
            log::info!("  Module dir: {}", dir.display());
        }
        for path in &self.modules.paths {
            log::info!("  Module: {}", path.display());
        }
        log::info!(
            "  Prefix: {}, max modules: {}, recursive: {}",
            self.modules.prefix,
            self.modules.max_modules,
            self.modules.recursive
        );
        if self.hot_reload.enabled {
            log::info!("  Hot reload: enabled, debounce={}ms", self.hot_reload.debounce_ms);
        } else {
            log::info!("  Hot reload: disabled");
        }
        log::info!(
            "  Frame: {} fps, max delta {}s",
            self.frame.target_fps,
            self.frame.max_delta
        );
        if !self.cvars.is_empty() {
            log::info!("  CVar overrides: {}", self.cvars.len());
        }
        if let Some(ref path) = self.config_path {
            log::info!("  Config: {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.modules.dirs, vec![PathBuf::from("./modules")]);
        assert_eq!(config.modules.prefix, "module_");
        assert_eq!(config.modules.max_modules, 256);
        assert!(config.hot_reload.enabled);
        assert_eq!(config.hot_reload.debounce_ms, 500);
        assert_eq!(config.frame.target_fps, 60);
        assert!(config.cvars.is_empty());
    }

    #[test]
    fn test_parse_partial() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [modules]
            dirs = ["plugins"]
            max_modules = 8

            [frame]
            target_fps = 30

            [cvars]
            "renderer.width" = 1280
            "renderer.vsync" = false
            "#,
        )
        .unwrap();

        assert_eq!(config.modules.dirs, vec![PathBuf::from("plugins")]);
        assert_eq!(config.modules.max_modules, 8);
        assert_eq!(config.modules.prefix, "module_");
        assert_eq!(config.frame.target_fps, 30);
        assert_eq!(config.frame.max_delta, 0.1);
        assert_eq!(config.cvars.get("renderer.width"), Some(&toml::Value::Integer(1280)));
        assert_eq!(config.cvars.len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("[modules]\nmax_modules = \"lots\""),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_toml_str("[modules]\nmax_modules = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_toml_str("[frame]\nmax_delta = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("void.toml");
        std::fs::write(&path, "[hot_reload]\nenabled = false\n").unwrap();

        let config = RuntimeConfig::load_from_file(&path).unwrap();
        assert!(!config.hot_reload.enabled);
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_priority() {
        let dir = tempfile::tempdir().unwrap();
        let from_arg = dir.path().join("arg.toml");
        let from_env = dir.path().join("env.toml");
        std::fs::write(&from_arg, "[frame]\ntarget_fps = 30\n").unwrap();
        std::fs::write(&from_env, "[frame]\ntarget_fps = 120\n").unwrap();

        let config = RuntimeConfig::load_from(from_arg.to_str(), from_env.to_str()).unwrap();
        assert_eq!(config.frame.target_fps, 30);

        let config = RuntimeConfig::load_from(None, from_env.to_str()).unwrap();
        assert_eq!(config.frame.target_fps, 120);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = RuntimeConfig::load_from(Some("/nonexistent/void.toml"), None);
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_frame_time() {
        let frame = FrameConfig::default();
        assert_eq!(frame.target_frame_time(), Duration::from_secs_f64(1.0 / 60.0));
        let zero = FrameConfig {
            target_fps: 0,
            ..FrameConfig::default()
        };
        assert_eq!(zero.target_frame_time(), Duration::from_secs(1));
    }

    #[test]
    fn test_loader_config() {
        let mut config = RuntimeConfig::default();
        config.modules.max_modules = 4;
        config.modules.prefix = "plugin_".into();
        let loader = config.loader_config();
        assert_eq!(loader.max_modules, 4);
        assert_eq!(loader.prefix, "plugin_");
        assert!(loader.refresh_apis_on_reload);
    }
}
