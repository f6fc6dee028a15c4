//! Example module library
//!
//! Build it and point the runtime at the output directory:
//!
//! ```text
//! cargo build -p module_example
//! cargo run --bin void -- demos/void.toml
//! ```
//!
//! Rebuilding while the runtime runs reloads the library; the frame count
//! survives the swap through the reload state.

use parking_lot::{const_mutex, Mutex};
use serde::{Deserialize, Serialize};
use void_module::{export_module, CVarRegistry, ModuleContext, ModuleVTable, ReloadState, Result};
use void_runtime::kernel::{LogApi, GAME_ORDER, KERNEL_BUS, KERNEL_QUIT_EVENT, LOG_API_NAME};

/// Name under which [`GreeterApi`] is registered
pub const GREETER_API_NAME: &str = "void_greeter_a0";

/// API published for other modules
pub struct GreeterApi {
    pub greeting: fn() -> &'static str,
    pub frames: fn() -> u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExampleState {
    frames: u64,
}

// Statics live in the library image and reset on every reload
static STATE: Mutex<ExampleState> = const_mutex(ExampleState { frames: 0 });

fn greeting() -> &'static str {
    "hello from module_example"
}

fn frames() -> u64 {
    STATE.lock().frames
}

fn init(ctx: &mut ModuleContext<'_>) -> Result<()> {
    if let Some(log_api) = ctx.apis.get::<LogApi>(LOG_API_NAME) {
        log_api.install();
    }

    ctx.apis.register_api(GREETER_API_NAME, GreeterApi { greeting, frames })?;
    ctx.events.connect(KERNEL_BUS, KERNEL_QUIT_EVENT, GAME_ORDER, |_, _| {
        log::info!("module_example: quitting after {} frames", frames());
    })?;

    log::info!("module_example: {}", greeting());
    Ok(())
}

fn init_cvar(cvars: &mut CVarRegistry) -> Result<()> {
    cvars.register("example.report_every", 600i64, "Frames between status lines")
}

fn update(ctx: &mut ModuleContext<'_>, _dt: f32) {
    let every = ctx.cvars.get_int("example.report_every").unwrap_or(600).max(1) as u64;
    let mut state = STATE.lock();
    state.frames += 1;
    if state.frames % every == 0 {
        log::info!("module_example: {} frames", state.frames);
    }
}

fn shutdown(_ctx: &mut ModuleContext<'_>) {
    log::info!("module_example: shutting down");
}

fn reload_begin(_ctx: &mut ModuleContext<'_>) -> Option<ReloadState> {
    ReloadState::encode(&*STATE.lock()).ok()
}

fn reload_end(ctx: &mut ModuleContext<'_>, state: Option<ReloadState>) -> Result<()> {
    if let Some(state) = state {
        *STATE.lock() = state.decode()?;
    }
    init(ctx)
}

pub static VTABLE: ModuleVTable = ModuleVTable {
    init_cvar: Some(init_cvar),
    update: Some(update),
    shutdown: Some(shutdown),
    reload_begin: Some(reload_begin),
    reload_end: Some(reload_end),
    ..ModuleVTable::new("module_example", init)
};

export_module!(VTABLE);
