//! The module lifecycle interface

use serde::de::DeserializeOwned;
use serde::Serialize;

use void_event::EventHub;

use crate::api::ApiRegistry;
use crate::cvar::CVarRegistry;
use crate::error::{ModuleError, Result};

/// Everything a module callback may touch
pub struct ModuleContext<'a> {
    /// Named capability tables
    pub apis: &'a mut ApiRegistry,
    /// Event buses
    pub events: &'a mut EventHub,
    /// Console variables
    pub cvars: &'a mut CVarRegistry,
}

impl<'a> ModuleContext<'a> {
    /// Bundle the runtime services for a callback
    pub fn new(apis: &'a mut ApiRegistry, events: &'a mut EventHub, cvars: &'a mut CVarRegistry) -> Self {
        Self { apis, events, cvars }
    }

    /// Set the owner on both the registry and the hub, returning the previous one
    pub(crate) fn set_owner(&mut self, owner: Option<u64>) -> Option<u64> {
        self.events.set_owner(owner);
        self.apis.set_owner(owner)
    }
}

/// State carried from an old module image to its replacement
///
/// Owned bytes only, so nothing that references code in the old image can
/// outlive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadState {
    /// Type identifier for validation
    pub type_name: String,
    /// Serialized state data
    pub data: Vec<u8>,
}

impl ReloadState {
    /// Create a reload state from raw bytes
    pub fn new(type_name: &str, data: Vec<u8>) -> Self {
        Self {
            type_name: type_name.into(),
            data,
        }
    }

    /// Serialize a value with bincode
    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        let data = bincode::serialize(value).map_err(|e| ModuleError::Serialization(e.to_string()))?;
        Ok(Self::new(std::any::type_name::<T>(), data))
    }

    /// Deserialize a value written by [`encode`](Self::encode) for the same type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let expected = std::any::type_name::<T>();
        if self.type_name != expected {
            return Err(ModuleError::Serialization(format!(
                "reload state holds '{}', expected '{}'",
                self.type_name, expected
            )));
        }
        bincode::deserialize(&self.data).map_err(|e| ModuleError::Serialization(e.to_string()))
    }
}

/// A unit of functionality driven by the module loader
///
/// Passes run in this order for every module before the next pass starts:
/// `init`, `init_api`, `init_cvar`. Then `update` and `after_update` run
/// once per frame, and `shutdown` runs in reverse load order.
///
/// Register APIs and connect to events in `init`. Use `init_api` to look up
/// other modules' APIs; it is re-run after any module reloads, so cached
/// tables can be refreshed there.
pub trait Module: Send {
    /// Register APIs and subscriptions
    fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()>;

    /// Resolve APIs registered by other modules
    fn init_api(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Register console variables
    fn init_cvar(&mut self, _cvars: &mut CVarRegistry) -> Result<()> {
        Ok(())
    }

    /// Called once per frame
    fn update(&mut self, _ctx: &mut ModuleContext<'_>, _dt: f32) {}

    /// Called once per frame after every module's `update`
    fn after_update(&mut self, _ctx: &mut ModuleContext<'_>, _dt: f32) {}

    /// Release resources
    fn shutdown(&mut self, _ctx: &mut ModuleContext<'_>) {}

    /// Save state before this image is unloaded
    fn reload_begin(&mut self, _ctx: &mut ModuleContext<'_>) -> Option<ReloadState> {
        None
    }

    /// Restore state into a freshly loaded image
    ///
    /// The old image's registrations and subscriptions are gone by now, so
    /// the default simply runs `init` and `init_api` again.
    fn reload_end(&mut self, ctx: &mut ModuleContext<'_>, _state: Option<ReloadState>) -> Result<()> {
        self.init(ctx)?;
        self.init_api(ctx)
    }
}
