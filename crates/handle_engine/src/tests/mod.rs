//! Cross-module scenarios for the handle subsystem

mod frame_pacing;
