//! Core engine implementation

use std::sync::Arc;

use crate::{
    application::Application,
    core::config::{ApplicationConfig, ConfigError},
    core::frame::{FrameCounter, FrameInfo},
    foundation::time::Timer,
    memory::{DeferredDeallocator, HandleResult, RegistryDirectory, TeardownError, Unique},
};
use thiserror::Error;

/// Main engine struct
///
/// Owns the registry directory and the deferred deallocator and hands them
/// to collaborators explicitly; nothing here is reachable through globals.
pub struct Engine {
    /// Registries for every pooled type
    directory: Arc<RegistryDirectory>,

    /// Frame-delayed destruction queues
    deallocator: Arc<DeferredDeallocator>,

    /// Frames-in-flight bookkeeping
    frames: FrameCounter,

    /// Frame timing
    timer: Timer,

    /// Engine configuration
    config: ApplicationConfig,

    /// Whether the engine should continue running
    running: bool,
}

impl Engine {
    /// Create a new engine instance
    pub fn new(config: ApplicationConfig) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!(
            "Initializing engine for '{}' ({} frames in flight)",
            config.application_name,
            config.frames.frames_in_flight
        );

        let frames_in_flight = config.frames.frames_in_flight;
        Ok(Self {
            directory: Arc::new(RegistryDirectory::new(config.pools.clone())),
            deallocator: Arc::new(DeferredDeallocator::new(frames_in_flight)),
            frames: FrameCounter::new(frames_in_flight),
            timer: Timer::new(),
            config,
            running: true,
        })
    }

    /// Run the engine main loop with the given application
    pub fn run<T: Application>(config: ApplicationConfig, app: &mut T) -> Result<(), EngineError> {
        let mut engine = Self::new(config)?;

        app.initialize(&mut engine)
            .map_err(|e| EngineError::ApplicationError(format!("App initialization: {}", e)))?;

        log::info!("Starting main loop...");

        while engine.running {
            let frame = engine.begin_frame();

            if let Err(e) = app.update(&mut engine, frame) {
                // Still release everything the application queued
                app.cleanup(&mut engine);
                if let Err(shutdown_err) = engine.shutdown() {
                    log::error!("Shutdown after failed update: {}", shutdown_err);
                }
                return Err(EngineError::ApplicationError(format!("App update: {}", e)));
            }

            engine.end_frame();

            if let Some(max_frames) = engine.config.engine.max_frames {
                if frame.index + 1 >= max_frames {
                    engine.quit();
                }
            }
        }

        app.cleanup(&mut engine);
        engine.shutdown()?;

        log::info!("Engine shutdown complete");
        Ok(())
    }

    /// Start the next frame
    ///
    /// The slot being entered last carried frame `index - frames_in_flight`,
    /// whose GPU work is complete by now, so its deferred destructions run.
    pub fn begin_frame(&mut self) -> FrameInfo {
        let frame = self.frames.advance();
        let flushed = self.deallocator.begin_frame(frame.slot);
        log::trace!(
            "Frame {} (slot {}) began, {} deferred deallocations ran",
            frame.index,
            frame.slot,
            flushed
        );
        frame
    }

    /// Finish the current frame
    pub fn end_frame(&mut self) {
        self.timer.tick();
    }

    /// Create a `T` in its registry and take unique ownership of it
    pub fn create<T: Send + Sync + 'static>(&self, value: T) -> HandleResult<Unique<T>> {
        self.directory.create(value)
    }

    /// Shared registry directory, for injection into collaborators
    pub fn directory(&self) -> &Arc<RegistryDirectory> {
        &self.directory
    }

    /// Shared deferred deallocator, for injection into collaborators
    pub fn deallocator(&self) -> &Arc<DeferredDeallocator> {
        &self.deallocator
    }

    /// Frame currently being recorded
    pub fn current_frame(&self) -> FrameInfo {
        self.frames.current()
    }

    /// Engine configuration
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Seconds the last frame took
    pub fn delta_time(&self) -> f32 {
        self.timer.delta_time()
    }

    /// Whether the main loop keeps going
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Request engine shutdown
    pub fn quit(&mut self) {
        log::info!("Engine shutdown requested");
        self.running = false;
    }

    /// Flush all deferred work and tear the directory down
    ///
    /// Reports every registry that still holds live objects. Owners that
    /// outlive this call keep their registry alive and destroy into it
    /// normally.
    pub fn shutdown(self) -> Result<(), EngineError> {
        self.deallocator.teardown();

        if self.config.engine.report_stats {
            for stats in self.directory.stats() {
                log::info!(
                    "{}: {} live (peak {}), {} created, {} destroyed, {} slots in {} chunks, {} retired",
                    stats.type_name,
                    stats.live,
                    stats.peak_live,
                    stats.total_created,
                    stats.total_destroyed,
                    stats.capacity,
                    stats.chunks,
                    stats.retired
                );
            }
            log::info!(
                "Ran {} frames, {:.1} fps average",
                self.timer.ticks(),
                self.timer.average_fps()
            );
        }

        self.directory.teardown()?;
        Ok(())
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration rejected at startup
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Registries still held objects at shutdown
    #[error("Teardown error: {0}")]
    Teardown(#[from] TeardownError),

    /// Application error
    #[error("Application error: {0}")]
    ApplicationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::AppError;
    use crate::core::config::{EngineSettings, FrameConfig};
    use crate::memory::{Handle, SlotRegistry};

    struct Mesh {
        vertices: usize,
    }

    fn config(frames_in_flight: usize) -> ApplicationConfig {
        ApplicationConfig::new("engine test")
            .with_frames(FrameConfig::new().with_frames_in_flight(frames_in_flight))
            .with_engine(EngineSettings::new().with_report_stats(false))
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(Engine::new(config(0)), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_deferred_destruction_follows_frames() {
        let mut engine = Engine::new(config(2)).expect("Should init");
        let first = engine.begin_frame();
        assert_eq!(first, FrameInfo { index: 0, slot: 0 });

        let mesh = engine.create(Mesh { vertices: 3 }).expect("Should create");
        let handle = mesh.handle();
        let registry = Arc::clone(mesh.registry());
        mesh.destroy_deferred(engine.deallocator());
        engine.end_frame();

        engine.begin_frame();
        assert!(registry.is_alive(handle));
        engine.end_frame();

        engine.begin_frame();
        assert!(!registry.is_alive(handle));
        engine.shutdown().expect("Clean shutdown");
    }

    #[test]
    fn test_shutdown_flushes_pending_work() {
        let mut engine = Engine::new(config(3)).expect("Should init");
        engine.begin_frame();
        let mesh = engine.create(Mesh { vertices: 4 }).expect("Should create");
        mesh.destroy_deferred(engine.deallocator());
        assert_eq!(engine.deallocator().pending(), 1);
        assert!(engine.shutdown().is_ok());
    }

    #[test]
    fn test_shutdown_reports_leaks() {
        let engine = Engine::new(config(2)).expect("Should init");
        let registry = engine.directory().registry::<Mesh>();
        let leaked = registry.create(Mesh { vertices: 5 }).expect("Should create");

        assert!(matches!(engine.shutdown(), Err(EngineError::Teardown(_))));
        assert_eq!(registry.with(leaked, |m| m.vertices), Ok(5));
        registry.destroy(leaked).expect("Should destroy");
    }

    struct CountingApp {
        updates: u64,
        mesh: Option<Unique<Mesh>>,
    }

    impl Application for CountingApp {
        fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
            self.mesh = Some(engine.create(Mesh { vertices: 8 })?);
            Ok(())
        }

        fn update(&mut self, engine: &mut Engine, frame: FrameInfo) -> Result<(), AppError> {
            assert_eq!(frame.index, self.updates);
            self.updates += 1;
            if self.updates == 3 {
                if let Some(mesh) = self.mesh.take() {
                    mesh.destroy_deferred(engine.deallocator());
                }
            }
            Ok(())
        }

        fn cleanup(&mut self, _engine: &mut Engine) {}
    }

    struct FailingApp {
        leaked: Option<Handle<Mesh>>,
        registry: Option<Arc<SlotRegistry<Mesh>>>,
    }

    impl Application for FailingApp {
        fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
            let registry = engine.directory().registry::<Mesh>();
            self.leaked = Some(registry.create(Mesh { vertices: 1 })?);
            self.registry = Some(registry);
            Ok(())
        }

        fn update(&mut self, _engine: &mut Engine, frame: FrameInfo) -> Result<(), AppError> {
            if frame.index == 2 {
                return Err(AppError::Custom("simulated device loss".to_string()));
            }
            Ok(())
        }

        fn cleanup(&mut self, _engine: &mut Engine) {}
    }

    #[test]
    fn test_update_error_still_shuts_down() {
        crate::foundation::logging::init_for_tests();
        let config = ApplicationConfig::new("failing app")
            .with_engine(EngineSettings::new().with_report_stats(false));
        let mut app = FailingApp { leaked: None, registry: None };

        let err = Engine::run(config, &mut app).expect_err("Update fails");
        assert!(matches!(err, EngineError::ApplicationError(ref message) if message.contains("simulated device loss")));

        // Leak was reported, not swallowed into a panic; the object is still reachable
        let registry = app.registry.take().expect("Initialized");
        let leaked = app.leaked.take().expect("Initialized");
        assert_eq!(registry.with(leaked, |m| m.vertices), Ok(1));
        registry.destroy(leaked).expect("Should destroy");
    }

    #[test]
    fn test_run_stops_after_max_frames() {
        let config = ApplicationConfig::new("run test")
            .with_engine(EngineSettings::new().with_max_frames(5).with_report_stats(false));
        let mut app = CountingApp { updates: 0, mesh: None };
        Engine::run(config, &mut app).expect("Should run");
        assert_eq!(app.updates, 5);
        assert!(app.mesh.is_none());
    }
}
