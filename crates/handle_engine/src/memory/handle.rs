//! Packed 64-bit handles
//!
//! A handle is a plain value: `slot`, `version` and `type_tag` packed into
//! one `u64`. It owns nothing and is only meaningful relative to the
//! registry that produced it.
//!
//! # Bit Layout
//!
//! ```text
//! 63          48 47                  24 23                   0
//! +-------------+----------------------+----------------------+
//! |  type tag   |       version        |         slot         |
//! +-------------+----------------------+----------------------+
//! ```

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Bits reserved for the slot index
pub const SLOT_BITS: u32 = 24;

/// Bits reserved for the per-slot version
pub const VERSION_BITS: u32 = 24;

/// Bits reserved for the embedded type tag
pub const TAG_BITS: u32 = 16;

const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;
const VERSION_MASK: u64 = (1 << VERSION_BITS) - 1;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;

/// Number of addressable slots per registry.
///
/// The all-ones slot index is reserved so that no real handle can ever
/// equal [`RawHandle::INVALID`].
pub const MAX_SLOTS: usize = (1 << SLOT_BITS) - 1;

/// Largest representable version before wrapping
pub const MAX_VERSION: u32 = VERSION_MASK as u32;

/// Reduced hash identifying the registry a handle belongs to
///
/// Registries mix their own instance id into the tag of their element
/// type, so a handle presented to a second registry of the same type fails
/// validation instead of resolving to an unrelated object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(u16);

impl TypeTag {
    /// Compute the tag for `T`
    ///
    /// Stable for the lifetime of the process. Never zero, so a zeroed
    /// handle cannot masquerade as a tagged one.
    pub fn of<T: 'static>() -> Self {
        Self::from_type_id(TypeId::of::<T>())
    }

    /// Compute the tag for an already-erased type identity
    pub fn from_type_id(type_id: TypeId) -> Self {
        let mut hasher = DefaultHasher::new();
        type_id.hash(&mut hasher);
        let hash = hasher.finish();
        // Fold all 64 bits down so every byte of the hash contributes
        let folded = (hash ^ (hash >> 16) ^ (hash >> 32) ^ (hash >> 48)) & TAG_MASK;
        Self(if folded == 0 { 1 } else { folded as u16 })
    }

    /// Tag for registry instance `instance` holding elements of `type_id`
    ///
    /// Instance ids less than `2^16 - 1` apart always yield distinct tags
    /// for the same type. Never zero.
    pub fn for_instance(type_id: TypeId, instance: u64) -> Self {
        let base = u64::from(Self::from_type_id(type_id).0 - 1);
        let salted = (base + instance % TAG_MASK) % TAG_MASK;
        Self(salted as u16 + 1)
    }

    /// Raw tag bits
    pub fn bits(self) -> u16 {
        self.0
    }
}

/// Untyped packed handle
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(u64);

impl RawHandle {
    /// Sentinel for "never allocated"
    pub const INVALID: Self = Self(u64::MAX);

    /// Pack a handle from its parts
    ///
    /// `slot` and `version` are truncated to their bit widths.
    pub fn new(slot: u32, version: u32, tag: TypeTag) -> Self {
        let bits = (u64::from(slot) & SLOT_MASK)
            | ((u64::from(version) & VERSION_MASK) << SLOT_BITS)
            | ((u64::from(tag.0) & TAG_MASK) << (SLOT_BITS + VERSION_BITS));
        Self(bits)
    }

    /// Reinterpret raw bits as a handle
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Packed bits
    pub fn to_bits(self) -> u64 {
        self.0
    }

    /// Global slot index
    pub fn slot(self) -> u32 {
        (self.0 & SLOT_MASK) as u32
    }

    /// Generation of the slot this handle was issued for
    pub fn version(self) -> u32 {
        ((self.0 >> SLOT_BITS) & VERSION_MASK) as u32
    }

    /// Embedded type tag bits
    pub fn tag(self) -> u16 {
        ((self.0 >> (SLOT_BITS + VERSION_BITS)) & TAG_MASK) as u16
    }

    /// Whether this is the "never allocated" sentinel
    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }
}

impl Default for RawHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            return f.write_str("RawHandle(INVALID)");
        }
        f.debug_struct("RawHandle")
            .field("slot", &self.slot())
            .field("version", &self.version())
            .field("tag", &format_args!("{:#06x}", self.tag()))
            .finish()
    }
}

/// Typed handle to a pooled `T`
///
/// Carries no ownership. Use [`Unique`](super::Unique),
/// [`Ref`](super::Ref) or [`Weak`](super::Weak) for ownership semantics.
pub struct Handle<T> {
    raw: RawHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// The "never allocated" handle
    pub const fn invalid() -> Self {
        Self {
            raw: RawHandle::INVALID,
            _marker: PhantomData,
        }
    }

    /// Re-type a raw handle
    ///
    /// No check happens here; presenting the result to a registry of the
    /// wrong type fails validation with a type mismatch.
    pub const fn from_raw(raw: RawHandle) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Untyped view of this handle
    pub const fn raw(self) -> RawHandle {
        self.raw
    }

    /// Global slot index
    pub fn slot(self) -> u32 {
        self.raw.slot()
    }

    /// Slot generation this handle refers to
    pub fn version(self) -> u32 {
        self.raw.version()
    }

    /// Whether this is the "never allocated" sentinel
    pub fn is_invalid(self) -> bool {
        self.raw.is_invalid()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = short_type_name(std::any::type_name::<T>());
        if self.is_invalid() {
            return write!(f, "Handle<{short}>(INVALID)");
        }
        write!(f, "Handle<{short}>({}v{})", self.slot(), self.version())
    }
}

/// Strip module paths from every segment of a type name
///
/// `alloc::vec::Vec<game::Mesh>` becomes `Vec<Mesh>`.
fn short_type_name(name: &str) -> String {
    let mut short = String::with_capacity(name.len());
    let mut segment_start = 0;
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            short.truncate(segment_start);
        } else {
            short.push(c);
            if !(c.is_alphanumeric() || c == '_') {
                segment_start = short.len();
            }
        }
    }
    short
}

impl<T> From<Handle<T>> for RawHandle {
    fn from(handle: Handle<T>) -> Self {
        handle.raw
    }
}
