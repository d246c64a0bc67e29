//! # Unified Configuration System
//!
//! All tunables of the handle subsystem in one place. Every structure is
//! serializable so applications can ship them as TOML or RON files next to
//! their other settings.
//!
//! ## Configuration Categories
//!
//! - **Pool Config**: Chunk sizing and growth policy for every registry
//! - **Frame Config**: Frames in flight for deferred destruction
//! - **Engine Settings**: Logging and diagnostics
//! - **Application Config**: Top-level aggregate loaded by applications

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Default target byte size of one pool chunk
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// Upper bound on frames in flight
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// # Pool Configuration
///
/// Shapes the chunked storage behind every slot registry. The number of
/// elements per chunk is derived once per element type from `chunk_bytes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Target byte size of one chunk
    pub chunk_bytes: usize,
    /// Chunks allocated on the first growth
    pub initial_chunks: usize,
    /// Capacity multiplier on every later growth (1.5 = grow by 50%)
    pub growth_factor: f32,
    /// Optional cap below the one implied by the slot bit width
    pub max_chunks: Option<usize>,
}

impl PoolConfig {
    /// Create a pool configuration with defaults
    pub fn new() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            initial_chunks: 1,
            growth_factor: 1.5,
            max_chunks: None,
        }
    }

    /// Set the target chunk size in bytes
    pub fn with_chunk_bytes(mut self, bytes: usize) -> Self {
        self.chunk_bytes = bytes;
        self
    }

    /// Set the number of chunks allocated on first use
    pub fn with_initial_chunks(mut self, chunks: usize) -> Self {
        self.initial_chunks = chunks;
        self
    }

    /// Set the growth multiplier
    pub fn with_growth_factor(mut self, factor: f32) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Cap the number of chunks a registry may allocate
    pub fn with_max_chunks(mut self, chunks: usize) -> Self {
        self.max_chunks = Some(chunks);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_bytes == 0 {
            return Err("Chunk size must be at least 1 byte".to_string());
        }
        if self.initial_chunks == 0 {
            return Err("Initial chunk count must be at least 1".to_string());
        }
        if !(self.growth_factor > 1.0) {
            return Err(format!("Growth factor must exceed 1.0, got {}", self.growth_factor));
        }
        if self.max_chunks == Some(0) {
            return Err("Max chunks must be at least 1 when set".to_string());
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Frame Configuration
///
/// Number of frames the GPU may still be working on while the CPU records
/// the next one. Deferred destruction waits this many frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Maximum frames in flight
    pub frames_in_flight: usize,
}

impl FrameConfig {
    /// Create a frame configuration with defaults
    pub fn new() -> Self {
        Self { frames_in_flight: 2 }
    }

    /// Set maximum frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frames_in_flight == 0 {
            return Err("Frames in flight must be at least 1".to_string());
        }
        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(format!(
                "Frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            ));
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Engine Settings
///
/// Logging and diagnostics shared by the whole engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Log filter passed to the logger (e.g. `"info"`, `"handle_engine=debug"`)
    pub log_level: String,
    /// Log registry statistics at shutdown
    pub report_stats: bool,
    /// Stop after this many frames (`None` runs until the application quits)
    pub max_frames: Option<u64>,
}

impl EngineSettings {
    /// Create engine settings with defaults
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            report_stats: cfg!(debug_assertions),
            max_frames: None,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable the shutdown statistics report
    pub fn with_report_stats(mut self, enabled: bool) -> Self {
        self.report_stats = enabled;
        self
    }

    /// Stop the main loop after `frames` frames
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses all engine subsystems.
/// This is the main configuration structure applications should use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name, used in log output
    pub application_name: String,
    /// Engine core settings
    pub engine: EngineSettings,
    /// Pool sizing shared by every registry
    pub pools: PoolConfig,
    /// Frame pacing for deferred destruction
    pub frames: FrameConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            engine: EngineSettings::default(),
            pools: PoolConfig::default(),
            frames: FrameConfig::default(),
        }
    }

    /// Replace the pool configuration
    pub fn with_pools(mut self, pools: PoolConfig) -> Self {
        self.pools = pools;
        self
    }

    /// Replace the frame configuration
    pub fn with_frames(mut self, frames: FrameConfig) -> Self {
        self.frames = frames;
        self
    }

    /// Replace the engine settings
    pub fn with_engine(mut self, engine: EngineSettings) -> Self {
        self.engine = engine;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        self.pools.validate().map_err(ConfigError::Invalid)?;
        self.frames.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self::new("Handle Engine Application")
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ApplicationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_frames_in_flight() {
        assert!(FrameConfig::new().with_frames_in_flight(0).validate().is_err());
        assert!(FrameConfig::new().with_frames_in_flight(9).validate().is_err());
        assert!(FrameConfig::new().with_frames_in_flight(3).validate().is_ok());
    }

    #[test]
    fn test_invalid_pool_config() {
        assert!(PoolConfig::new().with_growth_factor(1.0).validate().is_err());
        assert!(PoolConfig::new().with_chunk_bytes(0).validate().is_err());
        assert!(PoolConfig::new().with_max_chunks(0).validate().is_err());
    }

    #[test]
    fn test_application_validation_wraps_errors() {
        let config = ApplicationConfig::new("demo").with_frames(FrameConfig::new().with_frames_in_flight(0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ApplicationConfig = toml::from_str(
            r#"
            application_name = "partial"

            [frames]
            frames_in_flight = 3
            "#,
        )
        .expect("Should parse");
        assert_eq!(config.frames.frames_in_flight, 3);
        assert_eq!(config.pools, PoolConfig::default());
    }
}
