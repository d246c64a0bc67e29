//! Pool demo application
//!
//! Drives the handle engine with three simulated collaborators: a GPU
//! resource layer, an input action map and an asset cache. Each frame
//! creates and releases objects at random, records draws against handles
//! and polls weak subscriptions, then the engine checks for leaks on exit.
//!
//! Reads `demo.toml` (or the path given as the first argument) if present.

mod assets;
mod gpu;
mod input;

use handle_engine::foundation::logging;
use handle_engine::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use assets::AssetCache;
use gpu::GpuResources;
use input::{ActionMap, Listener};

const DEFAULT_CONFIG_PATH: &str = "demo.toml";
const DEFAULT_FRAMES: u64 = 240;
const ACTIONS: [&str; 4] = ["move", "jump", "fire", "boost"];

/// Demo-level errors
#[derive(Error, Debug)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Collaborators created once the engine exists
struct Layers {
    gpu: GpuResources,
    actions: ActionMap,
    listener: Listener,
    cache: AssetCache,
}

struct PoolDemo {
    rng: StdRng,
    layers: Option<Layers>,
    draws: u64,
    failed_draws: u64,
}

impl PoolDemo {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            layers: None,
            draws: 0,
            failed_draws: 0,
        }
    }

    fn churn(&mut self, frame: FrameInfo) -> Result<(), AppError> {
        let Some(layers) = self.layers.as_mut() else {
            return Err(AppError::Custom("update before initialize".to_string()));
        };
        let rng = &mut self.rng;

        // GPU: a few uploads and releases every frame
        for _ in 0..rng.gen_range(1..6) {
            let bytes = rng.gen_range(256..65_536);
            layers.gpu.create_buffer("staging", bytes)?;
        }
        if rng.gen_bool(0.3) {
            let size = 1_u32 << rng.gen_range(4..10_u32);
            layers.gpu.create_texture("sprite", size, size)?;
        }
        let releases = rng.gen_range(0..5);
        layers.gpu.release_random(rng, releases);

        for _ in 0..8 {
            let Some((buffer, texture)) = layers.gpu.pick(rng) else {
                break;
            };
            match layers.gpu.record_draw(buffer, texture) {
                Ok(_) => self.draws += 1,
                Err(err) => {
                    log::warn!("Draw in frame {} skipped: {}", frame.index, err);
                    self.failed_draws += 1;
                }
            }
        }

        // Input: rebind an action now and then; subscribers drop it
        let action = ACTIONS[rng.gen_range(0..ACTIONS.len())];
        layers.actions.press(action, rng.gen())?;
        if frame.index % 60 == 59 {
            layers.actions.unbind(action);
            layers.actions.bind(action)?;
        }
        layers.listener.poll();

        // Assets: popular meshes stay cached, cold ones get evicted
        let content_id = rng.gen_range(0..32_u64);
        let mesh = layers.cache.load(content_id)?;
        let vertices = mesh.with(|m| m.vertex_count)?;
        log::trace!("Frame {} drew mesh {:x} ({} vertices)", frame.index, content_id, vertices);
        if layers.cache.len() > 16 {
            let ids = layers.cache.content_ids();
            layers.cache.evict(ids[rng.gen_range(0..ids.len())]);
        }

        Ok(())
    }
}

impl Application for PoolDemo {
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
        log::info!("Initializing pool demo...");
        let directory = engine.directory().clone();
        let deallocator = engine.deallocator().clone();

        let mut actions = ActionMap::new(directory.clone());
        for action in ACTIONS {
            actions.bind(action)?;
        }
        let listener = Listener::new(ACTIONS.iter().map(|name| actions.subscribe(name)).collect());

        self.layers = Some(Layers {
            gpu: GpuResources::new(directory.clone(), deallocator.clone()),
            actions,
            listener,
            cache: AssetCache::new(directory, deallocator),
        });
        Ok(())
    }

    fn update(&mut self, engine: &mut Engine, frame: FrameInfo) -> Result<(), AppError> {
        self.churn(frame)?;

        if frame.index % 60 == 0 {
            if let Some(layers) = &self.layers {
                log::info!(
                    "Frame {}: {} GPU resources ({} KiB), {} actions bound, {} cached meshes, {} deferred",
                    frame.index,
                    layers.gpu.live_resources(),
                    layers.gpu.device_memory() / 1024,
                    layers.actions.bound(),
                    layers.cache.len(),
                    engine.deallocator().pending()
                );
            }
        }
        Ok(())
    }

    fn cleanup(&mut self, _engine: &mut Engine) {
        let Some(mut layers) = self.layers.take() else {
            return;
        };
        let (hits, misses) = layers.cache.hit_stats();
        log::info!(
            "{} draws recorded, {} skipped; asset cache {} hits / {} misses; listener heard {} presses",
            self.draws,
            self.failed_draws,
            hits,
            misses,
            layers.listener.heard()
        );
        layers.gpu.release_all();
        layers.cache.clear();
    }
}

fn main() -> Result<(), DemoError> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let mut config = ApplicationConfig::load_or_default(&path)?;
    if config.engine.max_frames.is_none() {
        config.engine.max_frames = Some(DEFAULT_FRAMES);
    }

    logging::init_with_level(&config.engine.log_level);
    log::info!("Starting {} ({:?} frames)", config.application_name, config.engine.max_frames);

    let mut app = PoolDemo::new(0x5eed);
    Engine::run(config, &mut app)?;

    log::info!("Pool demo finished successfully");
    Ok(())
}
