//! Runtime errors

use thiserror::Error;
use void_event::EventError;
use void_module::ModuleError;

use crate::boot_config::ConfigError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime is not running")]
    NotRunning,

    #[error("Runtime already started")]
    AlreadyStarted,

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
