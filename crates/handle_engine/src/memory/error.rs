//! Handle validation and pool errors

use thiserror::Error;

/// Reasons a handle operation can fail.
///
/// Every variant is an expected runtime condition: hot paths (render
/// submission, input dispatch) branch on these instead of unwinding.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleError {
    /// Growth hit the hard chunk cap derived from the slot bit width
    #[error("Pool exhausted: {max_chunks} chunks of {elements_per_chunk} slots in use")]
    PoolExhausted {
        /// Maximum number of chunks the pool may hold
        max_chunks: usize,
        /// Slots per chunk
        elements_per_chunk: usize,
    },

    /// Handle is the "never allocated" sentinel
    #[error("Invalid handle")]
    InvalidHandle,

    /// Slot index beyond the pool's current capacity
    #[error("Slot {slot} out of range (capacity {capacity})")]
    OutOfRange {
        /// Offending slot index
        slot: u32,
        /// Capacity of the pool the handle was presented to
        capacity: usize,
    },

    /// Slot is currently free (object already destroyed)
    #[error("Access to freed slot {slot}")]
    StaleSlot {
        /// Offending slot index
        slot: u32,
    },

    /// Slot has been reused by a newer generation
    #[error("Version mismatch on slot {slot}: handle has {handle_version}, slot is at {current_version}")]
    VersionMismatch {
        /// Offending slot index
        slot: u32,
        /// Version carried by the handle
        handle_version: u32,
        /// Version currently stored for the slot
        current_version: u32,
    },

    /// Embedded type tag does not match the registry's element type
    #[error("Type mismatch: handle tagged {found:#06x}, registry expects {expected:#06x}")]
    TypeMismatch {
        /// Tag of the registry the handle was presented to
        expected: u16,
        /// Tag carried by the handle
        found: u16,
    },
}

impl HandleError {
    /// Whether the error means the target object no longer exists
    ///
    /// Weak observers treat these as normal disappearance rather than a
    /// broken handle.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::StaleSlot { .. } | Self::VersionMismatch { .. })
    }
}

/// Result alias for handle operations
pub type HandleResult<T> = Result<T, HandleError>;

/// A registry still held live objects when its directory was torn down
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeardownError {
    /// One or more registries leaked slots
    #[error("Registries still hold live objects: {}", format_leaks(.0))]
    LeakedSlots(Vec<LeakReport>),
}

/// Per-registry leak information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakReport {
    /// Element type name of the leaking registry
    pub type_name: &'static str,
    /// Number of live slots at teardown
    pub live: usize,
}

fn format_leaks(leaks: &[LeakReport]) -> String {
    leaks
        .iter()
        .map(|leak| format!("{} ({} live)", leak.type_name, leak.live))
        .collect::<Vec<_>>()
        .join(", ")
}
