//! Fixed-capacity object pool backing the inode, block, and file-handle
//! arenas.
//!
//! Grounded in the design notes' "arena-and-index representation... a pool
//! per object kind, ids as stable handles" and, stylistically, in the
//! teacher's own fixed-table allocation pattern for group descriptors
//! (`Ext4Fs::init_group_descriptors`, `src/fs/ext4/mod.rs`): a `Vec` sized
//! once at construction, plus a free list of reusable slots.

use alloc::vec::Vec;

use crate::errors::Error;

/// A stable integer handle into a [`Pool`]. Distinct from the on-disk
/// [`crate::ids::Id`]: a slot index is only meaningful to the RAM arena that
/// issued it, while an `Id` is meaningful on flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub u32);

/// A fixed-capacity object pool. `alloc` returns [`Error::NoMem`] once every
/// slot is occupied; `free` returns the slot for reuse.
pub struct Pool<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        let free = (0..capacity as u32).rev().collect();
        Self { slots, free }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn alloc(&mut self, value: T) -> Result<Slot, Error> {
        let idx = self.free.pop().ok_or(Error::NoMem)?;
        self.slots[idx as usize] = Some(value);
        Ok(Slot(idx))
    }

    pub fn free(&mut self, slot: Slot) -> Option<T> {
        let entry = self.slots.get_mut(slot.0 as usize)?;
        let taken = entry.take();
        if taken.is_some() {
            self.free.push(slot.0);
        }
        taken
    }

    pub fn get(&self, slot: Slot) -> Option<&T> {
        self.slots.get(slot.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        self.slots.get_mut(slot.0 as usize)?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|v| (Slot(i as u32), v)))
    }

    pub fn len(&self) -> usize {
        self.capacity() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_reuses_freed_slots() {
        let mut pool: Pool<u32> = Pool::with_capacity(2);
        let a = pool.alloc(1).unwrap();
        let _b = pool.alloc(2).unwrap();
        assert_eq!(pool.alloc(3), Err(Error::NoMem));
        pool.free(a);
        let c = pool.alloc(3).unwrap();
        assert_eq!(*pool.get(c).unwrap(), 3);
    }
}
