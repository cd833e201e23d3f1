//! Generation-checked handle table
//!
//! Values handed to the protocol engine as opaque pointers are kept in an
//! arena owned by the bridge. The engine only ever sees an encoded
//! `(index, generation)` pair. A slot's generation is bumped on removal, so a
//! handle used after cleanup, or a forged one, fails the lookup instead of
//! touching freed state.
//!
//! ```text
//! raw handle (usize) = generation << INDEX_BITS | (index + 1)
//! ```
//!
//! The `+ 1` keeps every valid raw handle non-zero, so null stays "no handle".

use std::collections::TryReserveError;
use thiserror::Error;

/// Bits of a raw handle used for the slot index
const INDEX_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u64 = (1u64 << (usize::BITS - INDEX_BITS)) - 1;

/// Largest number of live slots addressable by a raw handle
pub const MAX_SLOTS: usize = INDEX_MASK - 1;

/// Errors from inserting into a handle table
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("Handle table allocation failed: {0}")]
    OutOfMemory(#[from] TryReserveError),

    #[error("Handle table is full")]
    Exhausted,
}

/// Opaque reference to a slot in a `HandleTable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Encode as a non-zero pointer-sized integer
    pub fn to_raw(self) -> usize {
        let generation = (u64::from(self.generation) & GENERATION_MASK) as usize;
        (generation << INDEX_BITS) | (self.index as usize + 1)
    }

    /// Decode a raw handle; `0` is never a handle
    pub fn from_raw(raw: usize) -> Option<Self> {
        let slot = raw & INDEX_MASK;
        if slot == 0 {
            return None;
        }
        Some(Self {
            index: (slot - 1) as u32,
            generation: (raw >> INDEX_BITS) as u32,
        })
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of values addressed by generation-checked handles
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value and return its handle
    pub fn insert(&mut self, value: T) -> Result<Handle, HandleError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() >= MAX_SLOTS {
                    return Err(HandleError::Exhausted);
                }
                self.slots.try_reserve(1)?;
                // Reserve room to recycle this slot later without allocating
                self.free.try_reserve(self.slots.len() + 1 - self.free.len())?;
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.live += 1;

        Ok(Handle {
            index,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| generation_matches(slot.generation, handle.generation))
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| generation_matches(slot.generation, handle.generation))
            .and_then(|slot| slot.value.as_mut())
    }

    /// Remove a value; the handle and any copies of it become stale
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if !generation_matches(slot.generation, handle.generation) {
            return None;
        }
        let value = slot.value.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;

        Some(value)
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

/// Compare generations at the precision that survives raw encoding
fn generation_matches(stored: u32, presented: u32) -> bool {
    (u64::from(stored) & GENERATION_MASK) == (u64::from(presented) & GENERATION_MASK)
}
