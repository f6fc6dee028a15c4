//! Kernel bus and API
//!
//! The runtime owns one bus, [`KERNEL_BUS`], and publishes the frame
//! lifecycle on it. Modules connect at a priority inside one of the order
//! bands so systems from different modules interleave predictably:
//!
//! | band           | value |
//! |----------------|-------|
//! | `KERNEL_ORDER` | 1024  |
//! | `GAME_ORDER`   | 2048  |
//! | `RENDER_ORDER` | 3072  |
//!
//! Update events carry a [`FrameEvent`] payload.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};
use void_core::id64;

pub const KERNEL_BUS: u64 = id64("kernel");

/// Published once after every module is running
pub const KERNEL_INIT_EVENT: u64 = id64("kernel.init");
/// Published every frame after module `update`
pub const KERNEL_UPDATE_EVENT: u64 = id64("kernel.update");
/// Published every frame after module `after_update`
pub const KERNEL_POST_UPDATE_EVENT: u64 = id64("kernel.post_update");
/// Published once when a quit is requested
pub const KERNEL_QUIT_EVENT: u64 = id64("kernel.quit");
/// Published once before modules shut down
pub const KERNEL_SHUTDOWN_EVENT: u64 = id64("kernel.shutdown");

pub const KERNEL_ORDER: i32 = 1024;
pub const GAME_ORDER: i32 = 2048;
pub const RENDER_ORDER: i32 = 3072;

/// Registry name of [`KernelApi`]
pub const KERNEL_API_NAME: &str = "void_kernel_a0";

/// Registry name of [`LogApi`]
pub const LOG_API_NAME: &str = "void_log_a0";

/// Payload of the update events
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameEvent {
    /// Frame number, starting at 1
    pub frame: u64,
    /// Seconds since the previous frame, clamped
    pub dt: f32,
    _pad: u32,
}

impl FrameEvent {
    pub fn new(frame: u64, dt: f32) -> Self {
        Self { frame, dt, _pad: 0 }
    }
}

/// Runtime services exposed to modules
///
/// Registered as `Arc<KernelApi>`:
///
/// ```
/// # use std::sync::Arc;
/// # use void_module::ApiRegistry;
/// # use void_runtime::kernel::{KernelApi, KERNEL_API_NAME};
/// # let mut apis = ApiRegistry::new();
/// # apis.register_api(KERNEL_API_NAME, Arc::new(KernelApi::default())).unwrap();
/// let kernel = apis.get::<Arc<KernelApi>>(KERNEL_API_NAME).unwrap();
/// kernel.request_quit();
/// assert!(kernel.quit_requested());
/// ```
#[derive(Debug, Default)]
pub struct KernelApi {
    quit: AtomicBool,
    frame: AtomicU64,
}

impl KernelApi {
    /// Ask the runtime to stop after the current frame
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Number of the frame being run
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    pub(crate) fn set_frame(&self, frame: u64) {
        self.frame.store(frame, Ordering::Relaxed);
    }
}

/// The host's logger, for module libraries
///
/// A shared library carries its own copy of the `log` facade with no logger
/// installed. Calling [`install`](Self::install) from the module's `init`
/// routes its records to the host.
#[derive(Clone, Copy)]
pub struct LogApi {
    pub logger: &'static dyn log::Log,
    pub level: log::LevelFilter,
}

impl LogApi {
    /// Capture the logger currently installed in this binary
    pub fn current() -> Self {
        Self {
            logger: log::logger(),
            level: log::max_level(),
        }
    }

    /// Install the captured logger in the calling binary
    ///
    /// Has no effect on the logger where one is already installed, which is
    /// always the case for modules compiled into the host.
    pub fn install(&self) {
        if log::set_logger(self.logger).is_ok() {
            log::set_max_level(self.level);
        }
    }
}

impl std::fmt::Debug for LogApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogApi").field("level", &self.level).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_event_layout() {
        assert_eq!(std::mem::size_of::<FrameEvent>(), 16);
        let event = FrameEvent::new(3, 0.5);
        let bytes = bytemuck::bytes_of(&event);
        assert_eq!(bytemuck::pod_read_unaligned::<FrameEvent>(bytes), event);
    }

    #[test]
    fn test_order_bands() {
        assert!(KERNEL_ORDER < GAME_ORDER && GAME_ORDER < RENDER_ORDER);
    }

    #[test]
    fn test_kernel_api() {
        let kernel = KernelApi::default();
        assert!(!kernel.quit_requested());
        kernel.set_frame(9);
        assert_eq!(kernel.frame(), 9);
        kernel.request_quit();
        assert!(kernel.quit_requested());
    }
}
