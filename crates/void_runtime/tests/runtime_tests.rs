//! Integration tests for the module runtime

use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use void_module::{
    CVarRegistry, MemoryImageLoader, Module, ModuleContext, ModuleError, ModuleState, ReloadState, Result,
};
use void_runtime::kernel::{
    FrameEvent, KernelApi, GAME_ORDER, KERNEL_API_NAME, KERNEL_BUS, KERNEL_INIT_EVENT, KERNEL_ORDER,
    KERNEL_POST_UPDATE_EVENT, KERNEL_QUIT_EVENT, KERNEL_SHUTDOWN_EVENT, KERNEL_UPDATE_EVENT,
};
use void_runtime::{Runtime, RuntimeConfig, RuntimeError, RuntimeState};

type Log = Arc<Mutex<Vec<String>>>;

fn headless() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.modules.dirs.clear();
    config.hot_reload.enabled = false;
    config
}

/// Records its callbacks and the kernel events it receives
struct Recorder {
    name: &'static str,
    priority: i32,
    log: Log,
}

impl Recorder {
    fn boxed(name: &'static str, priority: i32, log: &Log) -> Box<dyn Module> {
        Box::new(Recorder {
            name,
            priority,
            log: log.clone(),
        })
    }

    fn note(&self, what: &str) {
        self.log.lock().push(format!("{}:{}", what, self.name));
    }
}

impl Module for Recorder {
    fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        for (event_type, label) in [
            (KERNEL_INIT_EVENT, "init_event"),
            (KERNEL_UPDATE_EVENT, "update_event"),
            (KERNEL_POST_UPDATE_EVENT, "post_event"),
            (KERNEL_SHUTDOWN_EVENT, "shutdown_event"),
        ] {
            let log = self.log.clone();
            let name = self.name;
            ctx.events.connect(KERNEL_BUS, event_type, self.priority, move |_, _| {
                log.lock().push(format!("{}:{}", label, name));
            })?;
        }
        Ok(())
    }

    fn update(&mut self, _ctx: &mut ModuleContext<'_>, _dt: f32) {
        self.note("update");
    }

    fn after_update(&mut self, _ctx: &mut ModuleContext<'_>, _dt: f32) {
        self.note("after_update");
    }

    fn shutdown(&mut self, _ctx: &mut ModuleContext<'_>) {
        self.note("shutdown");
    }
}

/// Counts frames and carries the count across reloads
struct Counter {
    count: u32,
    seen: Arc<Mutex<Vec<u32>>>,
}

impl Module for Counter {
    fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        ctx.apis.register_api("void_counter_a0", 1u32)?;
        Ok(())
    }

    fn update(&mut self, _ctx: &mut ModuleContext<'_>, _dt: f32) {
        self.count += 1;
    }

    fn reload_begin(&mut self, _ctx: &mut ModuleContext<'_>) -> Option<ReloadState> {
        ReloadState::encode(&self.count).ok()
    }

    fn reload_end(&mut self, ctx: &mut ModuleContext<'_>, state: Option<ReloadState>) -> Result<()> {
        if let Some(state) = state {
            self.count = state.decode()?;
        }
        self.seen.lock().push(self.count);
        self.init(ctx)
    }
}

fn counter_images(path: &str, seen: &Arc<Mutex<Vec<u32>>>) -> MemoryImageLoader {
    let images = MemoryImageLoader::new();
    let seen = seen.clone();
    images.insert(path, move || {
        Box::new(Counter {
            count: 0,
            seen: seen.clone(),
        })
    });
    images
}

#[test]
fn test_frame_lifecycle_order() {
    let log = Log::default();
    let mut runtime = Runtime::new(headless(), MemoryImageLoader::new()).unwrap();
    runtime.add_static("game", Recorder::boxed("game", GAME_ORDER, &log)).unwrap();
    runtime.add_static("core", Recorder::boxed("core", KERNEL_ORDER, &log)).unwrap();

    runtime.start().unwrap();
    assert_eq!(*log.lock(), vec!["init_event:core", "init_event:game"]);
    log.lock().clear();

    runtime.step(0.016).unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "update:game",
            "update:core",
            "update_event:core",
            "update_event:game",
            "after_update:game",
            "after_update:core",
            "post_event:core",
            "post_event:game",
        ]
    );
    log.lock().clear();

    runtime.shutdown();
    assert_eq!(
        *log.lock(),
        vec!["shutdown_event:core", "shutdown_event:game", "shutdown:core", "shutdown:game"]
    );
}

#[test]
fn test_frame_event_dt_clamped() {
    struct Clock {
        frames: Arc<Mutex<Vec<FrameEvent>>>,
    }

    impl Module for Clock {
        fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
            let frames = self.frames.clone();
            ctx.events.connect(KERNEL_BUS, KERNEL_UPDATE_EVENT, GAME_ORDER, move |_, event| {
                if let Some(frame) = event.read::<FrameEvent>() {
                    frames.lock().push(frame);
                }
            })?;
            Ok(())
        }
    }

    let frames = Arc::new(Mutex::new(Vec::new()));
    let mut runtime = Runtime::new(headless(), MemoryImageLoader::new()).unwrap();
    runtime
        .add_static("clock", Box::new(Clock { frames: frames.clone() }))
        .unwrap();
    runtime.start().unwrap();

    runtime.step(0.05).unwrap();
    runtime.step(5.0).unwrap();
    runtime.step(-1.0).unwrap();

    let frames = frames.lock();
    assert_eq!(frames.len(), 3);
    assert_eq!((frames[0].frame, frames[0].dt), (1, 0.05));
    assert_eq!((frames[1].frame, frames[1].dt), (2, 0.1));
    assert_eq!((frames[2].frame, frames[2].dt), (3, 0.0));
}

#[test]
fn test_module_requests_quit() {
    struct Quitter {
        frames: u32,
        quits: Arc<Mutex<u32>>,
    }

    impl Module for Quitter {
        fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
            let quits = self.quits.clone();
            ctx.events.connect(KERNEL_BUS, KERNEL_QUIT_EVENT, KERNEL_ORDER, move |_, _| {
                *quits.lock() += 1;
            })?;
            Ok(())
        }

        fn update(&mut self, ctx: &mut ModuleContext<'_>, _dt: f32) {
            self.frames += 1;
            if self.frames == 3 {
                if let Some(kernel) = ctx.apis.get::<Arc<KernelApi>>(KERNEL_API_NAME) {
                    kernel.request_quit();
                }
            }
        }
    }

    let quits = Arc::new(Mutex::new(0));
    let mut runtime = Runtime::new(headless(), MemoryImageLoader::new()).unwrap();
    runtime
        .add_static(
            "quitter",
            Box::new(Quitter {
                frames: 0,
                quits: quits.clone(),
            }),
        )
        .unwrap();
    runtime.start().unwrap();

    let mut guard = 0;
    while runtime.is_running() && guard < 100 {
        runtime.step(0.016).unwrap();
        guard += 1;
    }

    assert_eq!(runtime.frame(), 3);
    assert_eq!(*quits.lock(), 1);
    assert_eq!(runtime.state(), RuntimeState::Running);

    runtime.shutdown();
    assert_eq!(runtime.state(), RuntimeState::Stopped);
}

#[test]
fn test_cvar_overrides_from_config_file() {
    struct Tunable;

    impl Module for Tunable {
        fn init(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<()> {
            Ok(())
        }

        fn init_cvar(&mut self, cvars: &mut CVarRegistry) -> Result<()> {
            cvars.register("game.speed", 1.0, "Simulation speed")?;
            cvars.register("game.name", "void", "Window title")?;
            Ok(())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("void.toml");
    std::fs::write(
        &path,
        r#"
        [modules]
        dirs = []

        [hot_reload]
        enabled = false

        [cvars]
        "game.speed" = 2.5
        "game.unknown" = 1
        "#,
    )
    .unwrap();

    let config = RuntimeConfig::load_from_file(&path).unwrap();
    let mut runtime = Runtime::new(config, MemoryImageLoader::new()).unwrap();
    runtime.add_static("tunable", Box::new(Tunable)).unwrap();
    runtime.start().unwrap();

    assert_eq!(runtime.cvars().get_float("game.speed"), Some(2.5));
    assert_eq!(runtime.cvars().get_str("game.name"), Some("void"));
    assert!(runtime.cvars().get("game.unknown").is_none());
}

#[test]
fn test_load_modules_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let library = |stem: &str| dir.path().join(format!("{}{}.{}", DLL_PREFIX, stem, DLL_EXTENSION));

    let images = MemoryImageLoader::new();
    let log = Log::default();
    for (stem, name) in [("module_alpha", "alpha"), ("module_beta", "beta")] {
        let path = library(stem);
        std::fs::write(&path, b"").unwrap();
        let log = log.clone();
        images.insert(path, move || Recorder::boxed(name, GAME_ORDER, &log));
    }
    std::fs::write(library("helper"), b"").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

    let mut config = headless();
    config.modules.dirs = vec![dir.path().to_path_buf()];
    config.modules.paths = vec![PathBuf::from("modules/module_missing")];

    let mut runtime = Runtime::new(config, images).unwrap();
    assert_eq!(runtime.load_modules().unwrap(), 2);
    runtime.start().unwrap();

    let loader = runtime.loader();
    assert_eq!(loader.len(), 2);
    let alpha = loader.find_by_name("module_alpha").unwrap();
    assert_eq!(loader.state(alpha), Some(ModuleState::Running));
    assert!(loader.find_by_name("module_beta").is_some());
    assert_eq!(*log.lock(), vec!["init_event:alpha", "init_event:beta"]);
}

#[test]
fn test_reload_keeps_state() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let images = counter_images("modules/module_counter", &seen);

    let mut config = headless();
    config.modules.paths = vec![PathBuf::from("modules/module_counter")];

    let mut runtime = Runtime::new(config, images).unwrap();
    assert!(matches!(
        runtime.reload("modules/module_counter"),
        Err(RuntimeError::NotRunning)
    ));

    assert_eq!(runtime.load_modules().unwrap(), 1);
    runtime.start().unwrap();
    for _ in 0..3 {
        runtime.step(0.016).unwrap();
    }

    runtime.reload("modules/module_counter").unwrap();
    assert_eq!(*seen.lock(), vec![3]);
    assert!(runtime.apis().contains("void_counter_a0"));

    runtime.step(0.016).unwrap();
    assert_eq!(runtime.reload_all().unwrap(), 1);
    assert_eq!(*seen.lock(), vec![3, 4]);

    assert!(matches!(
        runtime.reload("modules/module_other"),
        Err(RuntimeError::Module(ModuleError::NotFound(_)))
    ));
}

#[cfg(feature = "hot-reload")]
#[test]
fn test_poll_hot_reload() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let images = counter_images("modules/module_counter", &seen);
    let log = Log::default();
    {
        let log = log.clone();
        images.insert("modules/module_late", move || Recorder::boxed("late", GAME_ORDER, &log));
    }

    let mut config = headless();
    config.modules.paths = vec![PathBuf::from("modules/module_counter")];

    let mut runtime = Runtime::new(config, images).unwrap();
    runtime.load_modules().unwrap();
    runtime.start().unwrap();
    runtime.step(0.016).unwrap();
    runtime.step(0.016).unwrap();

    let watcher = runtime.watcher_mut();
    assert!(!watcher.is_enabled());
    watcher.set_debounce(std::time::Duration::ZERO);
    watcher.trigger("modules/module_counter");
    watcher.trigger("modules/module_late");

    assert_eq!(runtime.poll_hot_reload(), 2);
    assert_eq!(*seen.lock(), vec![2]);

    let late = runtime.loader().find_by_name("module_late").unwrap();
    assert_eq!(runtime.loader().state(late), Some(ModuleState::Running));
    assert_eq!(runtime.loader().len(), 2);

    assert_eq!(runtime.poll_hot_reload(), 0);
}

/// Fails every init
struct Broken;

impl Module for Broken {
    fn init(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<()> {
        Err(ModuleError::module("no device"))
    }
}

#[test]
fn test_start_failure_rolls_back() {
    let log = Log::default();
    let mut runtime = Runtime::new(headless(), MemoryImageLoader::new()).unwrap();
    runtime.add_static("core", Recorder::boxed("core", KERNEL_ORDER, &log)).unwrap();
    runtime.add_static("broken", Box::new(Broken)).unwrap();

    let err = runtime.start().unwrap_err();
    assert!(matches!(err, RuntimeError::Module(ModuleError::InitFailed { .. })));
    assert_eq!(runtime.state(), RuntimeState::Created);
    assert_eq!(*log.lock(), vec!["shutdown:core"]);
    assert_eq!(runtime.events().subscriber_count(KERNEL_BUS, KERNEL_UPDATE_EVENT), 0);
}

#[test]
fn test_drop_shuts_down_modules() {
    let log = Log::default();
    {
        let mut runtime = Runtime::new(headless(), MemoryImageLoader::new()).unwrap();
        runtime.add_static("core", Recorder::boxed("core", KERNEL_ORDER, &log)).unwrap();
        runtime.start().unwrap();
        log.lock().clear();
    }
    assert_eq!(*log.lock(), vec!["shutdown_event:core", "shutdown:core"]);
}

#[test]
fn test_failed_add_after_start_is_removed() {
    let log = Log::default();
    let mut runtime = Runtime::new(headless(), MemoryImageLoader::new()).unwrap();
    runtime.add_static("core", Recorder::boxed("core", KERNEL_ORDER, &log)).unwrap();
    runtime.start().unwrap();

    let result = runtime.add_static("bad", Box::new(Broken));
    assert!(matches!(
        result,
        Err(RuntimeError::Module(ModuleError::InitFailed { ref module, .. })) if module == "bad"
    ));
    assert!(runtime.loader().find_by_name("bad").is_none());

    // Later additions are not held back by the failed one
    let good = runtime.add_static("good", Recorder::boxed("good", GAME_ORDER, &log)).unwrap();
    assert_eq!(runtime.loader().state(good), Some(ModuleState::Running));
    log.lock().clear();
    runtime.step(0.016).unwrap();
    assert!(log.lock().contains(&"update:good".to_string()));
    assert!(log.lock().contains(&"update:core".to_string()));
}

#[test]
fn test_load_modules_after_start_skips_failures() {
    let log = Log::default();
    let images = MemoryImageLoader::new();
    images.insert("modules/module_broken", || Box::new(Broken));
    {
        let log = log.clone();
        images.insert("modules/module_late", move || Recorder::boxed("late", GAME_ORDER, &log));
    }

    let mut config = headless();
    config.modules.paths = vec![
        PathBuf::from("modules/module_broken"),
        PathBuf::from("modules/module_late"),
    ];

    let mut runtime = Runtime::new(config, images).unwrap();
    runtime.start().unwrap();
    assert_eq!(runtime.load_modules().unwrap(), 1);

    let loader = runtime.loader();
    assert!(loader.find_by_name("module_broken").is_none());
    let late = loader.find_by_name("module_late").unwrap();
    assert_eq!(loader.state(late), Some(ModuleState::Running));
    assert_eq!(loader.len(), 1);
}
