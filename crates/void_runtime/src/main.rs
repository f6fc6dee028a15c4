//! Void Runtime
//!
//! Loads the configured modules and runs frames until a module requests a
//! quit or the process gets Ctrl+C.
//!
//! Run with: cargo run --bin void [config.toml]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use void_module::DylibImageLoader;
use void_runtime::{Runtime, RuntimeConfig, RuntimeError};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match RuntimeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    config.print_summary();

    if let Err(e) = run(config) {
        log::error!("Runtime failed: {}", e);
        std::process::exit(1);
    }
}

fn run(config: RuntimeConfig) -> Result<(), RuntimeError> {
    let target_frame_time = config.frame.target_frame_time();

    let mut runtime = Runtime::new(config, DylibImageLoader)?;
    let loaded = runtime.load_modules()?;
    log::info!("Loaded {} modules", loaded);
    runtime.start()?;

    // Set up signal handler for clean shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, shutting down...");
        r.store(false, Ordering::SeqCst);
    }) {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    let mut last_frame = Instant::now();
    while running.load(Ordering::SeqCst) && runtime.is_running() {
        let frame_start = Instant::now();
        let dt = frame_start.duration_since(last_frame).as_secs_f32();
        last_frame = frame_start;

        runtime.poll_hot_reload();
        runtime.step(dt)?;

        // Frame pacing
        let elapsed = frame_start.elapsed();
        if elapsed < target_frame_time {
            std::thread::sleep(target_frame_time - elapsed);
        }
    }

    runtime.shutdown();
    Ok(())
}
