//! # Core Engine Module
//!
//! Shared abstractions the rest of the engine is configured and paced by.
//!
//! ## Organization
//!
//! - **Config**: Unified configuration for pools, frames and logging
//! - **Frame**: Frames-in-flight counter driving deferred destruction

pub mod config;
pub mod frame;

// Re-export commonly used config types
pub use config::{
    ApplicationConfig,
    Config,
    ConfigError,
    EngineSettings,
    FrameConfig,
    PoolConfig,
};
pub use frame::{FrameCounter, FrameInfo};
