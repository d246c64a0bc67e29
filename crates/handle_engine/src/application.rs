//! Application trait and lifecycle management

use crate::core::frame::FrameInfo;
use crate::engine::{Engine, EngineError};
use crate::memory::HandleError;
use thiserror::Error;

/// Application lifecycle trait
///
/// Implement this trait to drive the engine's frame loop.
pub trait Application {
    /// Initialize the application
    ///
    /// Called once after the engine is initialized. Create the initial set
    /// of pooled objects here.
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError>;

    /// Update the application
    ///
    /// Called every frame after deferred destructions for the retiring
    /// frame slot have run.
    ///
    /// # Arguments
    /// * `engine` - Mutable reference to the engine
    /// * `frame` - Frame index and frame-in-flight slot being recorded
    fn update(&mut self, engine: &mut Engine, frame: FrameInfo) -> Result<(), AppError>;

    /// Cleanup the application
    ///
    /// Called when the application is shutting down, before the engine
    /// flushes deferred work and checks registries for leaks. Release every
    /// owned handle here.
    fn cleanup(&mut self, engine: &mut Engine);
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine error propagated to application level
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Handle operation failed
    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}
