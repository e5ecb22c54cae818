//! Handle values.
//!
//! A handle is the caller-side name of a kernel object. Handle values pack a
//! handle-table slot index and a slot generation into a single `u64`, so a
//! value both locates its table slot and proves it was minted for the slot's
//! current occupant. Generations start at 1 and are bumped every time a slot
//! is vacated, which permanently invalidates every handle minted for the
//! previous occupant. A stale handle can therefore never resolve to a new
//! object that happens to reuse the slot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits the slot index occupies in a packed handle value.
const INDEX_BITS: u32 = 32;

/// Mask selecting the slot index from a packed handle value.
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// The caller-side name of a kernel object.
///
/// Handles are opaque to callers: the packed layout is an implementation
/// detail of the handle table, and nothing outside it should interpret the
/// raw value. The one public guarantee is that no allocated handle ever
/// equals [`Handle::INVALID`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u64);

impl Handle {
    /// The reserved invalid handle value. Never returned by allocation.
    pub const INVALID: Handle = Handle(0);

    /// Pack a slot index and generation into a handle value.
    pub fn from_parts(index: u32, generation: u32) -> Self {
        Handle(((generation as u64) << INDEX_BITS) | index as u64)
    }

    /// The handle-table slot index this handle refers to.
    pub fn index(&self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    /// The slot generation this handle was minted with.
    pub fn generation(&self) -> u32 {
        (self.0 >> INDEX_BITS) as u32
    }

    /// Check whether this is the reserved invalid value.
    pub fn is_invalid(&self) -> bool {
        self.0 == 0
    }

    /// The raw packed value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Rebuild a handle from a raw packed value.
    ///
    /// The result is only meaningful if `raw` came from [`Handle::raw`] on
    /// a handle minted by the same kernel; any other value simply fails to
    /// resolve.
    pub fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "Handle(invalid)")
        } else {
            write!(f, "Handle({}.{})", self.index(), self.generation())
        }
    }
}
