//! Message-scoped bump allocator.
//!
//! The arena is one fixed-capacity byte region that hands out consecutive
//! slices and is reclaimed wholesale. The batch driver resets it once per
//! message, so memory use stays bounded across an arbitrarily long batch.
//!
//! Allocations are addressed by [`Slot`] handles instead of references.
//! Every handle remembers the generation it was allocated in; once the arena
//! is reset, handles from earlier generations no longer resolve.

use crate::error::{Result, SmakError};

/// Handle to bytes allocated from an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    start: usize,
    len: usize,
    generation: u64,
}

impl Slot {
    /// Number of bytes in the allocation.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the allocation is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Position to rewind to, see [`Arena::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    cursor: usize,
    generation: u64,
}

/// Bump allocator over a fixed-capacity region.
#[derive(Debug)]
pub struct Arena {
    region: Vec<u8>,
    capacity: usize,
    generation: u64,
}

impl Arena {
    /// Reserve a region of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            region: Vec::with_capacity(capacity),
            capacity,
            generation: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out since the last reset.
    pub fn used(&self) -> usize {
        self.region.len()
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.capacity - self.region.len()
    }

    /// Allocate a copy of `bytes`.
    ///
    /// Fails with [`SmakError::ArenaExhausted`] when the remaining capacity is
    /// smaller than `bytes`. That failure is not tied to any one message.
    pub fn alloc_copy(&mut self, bytes: &[u8]) -> Result<Slot> {
        self.reserve(bytes.len())?;
        let start = self.region.len();
        self.region.extend_from_slice(bytes);
        Ok(self.slot(start, bytes.len()))
    }

    /// Resolve a slot. Returns `None` for handles from before the last reset
    /// or rewind.
    pub fn get(&self, slot: Slot) -> Option<&[u8]> {
        if slot.generation != self.generation || slot.start + slot.len > self.region.len() {
            return None;
        }
        Some(&self.region[slot.start..slot.start + slot.len])
    }

    /// Remember the current cursor.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            cursor: self.region.len(),
            generation: self.generation,
        }
    }

    /// Release everything allocated after `checkpoint`.
    ///
    /// All outstanding slots are invalidated, including those allocated
    /// before the checkpoint. A checkpoint from an earlier generation is
    /// ignored.
    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        if checkpoint.generation != self.generation || checkpoint.cursor > self.region.len() {
            return;
        }
        self.region.truncate(checkpoint.cursor);
        self.generation += 1;
    }

    /// Reset the cursor to the region base. Every outstanding slot becomes
    /// invalid.
    pub fn reset(&mut self) {
        self.region.clear();
        self.generation += 1;
    }

    fn reserve(&self, size: usize) -> Result<()> {
        let remaining = self.remaining();
        if size > remaining {
            return Err(SmakError::ArenaExhausted {
                requested: size,
                remaining,
            });
        }
        Ok(())
    }

    fn slot(&self, start: usize, len: usize) -> Slot {
        Slot {
            start,
            len,
            generation: self.generation,
        }
    }
}
