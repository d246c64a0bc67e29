//! Foundation module - Core utilities shared by every subsystem
//!
//! - Logging setup
//! - Frame timing

pub mod logging;
pub mod time;
