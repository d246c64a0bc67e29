//! # Handle Engine
//!
//! Generational handle pools for engine subsystems that share objects with
//! in-flight GPU work.
//!
//! ## Features
//!
//! - **Generational Handles**: 64-bit handles with slot, version and type tag
//! - **Chunked Pools**: Stable-index storage that grows by whole chunks
//! - **Ownership Views**: `Unique`, `Ref` and `Weak` wrappers over raw handles
//! - **Deferred Destruction**: Frames-in-flight aware deallocation queues
//! - **Type-Erased Directory**: One registry per pooled type, created lazily
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use handle_engine::prelude::*;
//!
//! struct Texture {
//!     width: u32,
//! }
//!
//! struct MyApp {
//!     texture: Option<Unique<Texture>>,
//! }
//!
//! impl Application for MyApp {
//!     fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
//!         self.texture = Some(engine.create(Texture { width: 512 })?);
//!         Ok(())
//!     }
//!
//!     fn update(&mut self, engine: &mut Engine, frame: FrameInfo) -> Result<(), AppError> {
//!         if frame.index == 10 {
//!             if let Some(texture) = self.texture.take() {
//!                 texture.destroy_deferred(engine.deallocator());
//!             }
//!             engine.quit();
//!         }
//!         Ok(())
//!     }
//!
//!     fn cleanup(&mut self, _engine: &mut Engine) {
//!         self.texture = None;
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::default();
//!     let mut app = MyApp { texture: None };
//!     Engine::run(config, &mut app)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod config;
pub mod core;
pub mod foundation;
pub mod memory;

mod application;
mod engine;

#[cfg(test)]
mod tests;

pub use application::{AppError, Application};
pub use engine::{Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::{ApplicationConfig, Config, ConfigError, EngineSettings, FrameConfig, FrameInfo, PoolConfig},
        foundation::time::Timer,
        memory::{
            DeferredDeallocator, Handle, HandleError, HandleResult, RawHandle, Ref, RegistryDirectory,
            SlotRegistry, Unique, Weak,
        },
        AppError, Application, Engine, EngineError,
    };
}
