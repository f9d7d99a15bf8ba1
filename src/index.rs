//! Object index: a fixed 256-bucket hash from id to in-RAM descriptor.
//!
//! Implemented as singly-linked buckets per §4.2, in the spirit of the
//! teacher's own preference for intrusive, allocation-light structures over
//! a general hash map (the teacher reaches for `hashbrown` only for the
//! disk-driver registry, never for hot filesystem metadata paths) — here
//! realized as a boxed linked list per bucket rather than a borrowed
//! `hashbrown::HashMap`, since ids need to dedupe against exactly one
//! current descriptor and never need map-wide resizing.

use alloc::boxed::Box;

use crate::errors::Error;
use crate::ids::Id;
use crate::pool::Slot;

/// Bucket count of the object index, per §6.
pub const BUCKET_COUNT: usize = 256;

/// The kind of object a descriptor's slot belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Inode,
    Block,
}

/// A descriptor held by the index: which pool the object lives in, and its
/// slot there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: ObjectKind,
    pub slot: Slot,
}

impl Descriptor {
    pub fn inode(slot: Slot) -> Self {
        Self {
            kind: ObjectKind::Inode,
            slot,
        }
    }

    pub fn block(slot: Slot) -> Self {
        Self {
            kind: ObjectKind::Block,
            slot,
        }
    }
}

struct Node {
    id: Id,
    desc: Descriptor,
    next: Option<Box<Node>>,
}

/// The process-wide id → descriptor hash, per §3's `Index` entity: it holds
/// exactly one (current, highest-seq) descriptor per live id.
pub struct Index {
    buckets: Box<[Option<Box<Node>>; BUCKET_COUNT]>,
}

impl Index {
    pub fn new() -> Self {
        Self {
            buckets: Box::new(core::array::from_fn(|_| None)),
        }
    }

    fn bucket_of(id: Id) -> usize {
        id.bucket()
    }

    /// Looks up `id`'s current descriptor.
    pub fn find(&self, id: Id) -> Option<Descriptor> {
        let mut cur = self.buckets[Self::bucket_of(id)].as_deref();
        while let Some(node) = cur {
            if node.id == id {
                return Some(node.desc);
            }
            cur = node.next.as_deref();
        }
        None
    }

    /// Typed lookup: returns the slot only if `id` is present and holds an
    /// inode descriptor, a not-found error otherwise.
    pub fn find_inode(&self, id: Id) -> Result<Slot, Error> {
        match self.find(id) {
            Some(Descriptor {
                kind: ObjectKind::Inode,
                slot,
            }) => Ok(slot),
            _ => Err(Error::NotFound),
        }
    }

    /// Typed lookup for block descriptors; see [`Index::find_inode`].
    pub fn find_block(&self, id: Id) -> Result<Slot, Error> {
        match self.find(id) {
            Some(Descriptor {
                kind: ObjectKind::Block,
                slot,
            }) => Ok(slot),
            _ => Err(Error::NotFound),
        }
    }

    /// Inserts a new entry. Per §4.2, insert never replaces an existing
    /// element — callers must `remove` the prior version of `id` first.
    pub fn insert(&mut self, id: Id, desc: Descriptor) -> Result<(), Error> {
        if self.find(id).is_some() {
            return Err(Error::Exists);
        }
        let bucket = Self::bucket_of(id);
        let node = Box::new(Node {
            id,
            desc,
            next: self.buckets[bucket].take(),
        });
        self.buckets[bucket] = Some(node);
        Ok(())
    }

    /// Removes and returns `id`'s descriptor, if present.
    pub fn remove(&mut self, id: Id) -> Option<Descriptor> {
        let bucket = Self::bucket_of(id);
        let mut cursor = &mut self.buckets[bucket];
        loop {
            match cursor {
                Some(node) if node.id == id => {
                    let mut boxed = cursor.take().unwrap();
                    *cursor = boxed.next.take();
                    return Some(boxed.desc);
                }
                Some(node) => cursor = &mut node.next,
                None => return None,
            }
        }
    }

    /// Visits every `(id, descriptor)` pair currently held, in unspecified
    /// bucket order.
    pub fn foreach<F: FnMut(Id, Descriptor)>(&self, mut f: F) {
        for bucket in self.buckets.iter() {
            let mut cur = bucket.as_deref();
            while let Some(node) = cur {
                f(node.id, node.desc);
                cur = node.next.as_deref();
            }
        }
    }

}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Slot;

    #[test]
    fn insert_find_remove_round_trip() {
        let mut idx = Index::new();
        let id = Id::new(42);
        idx.insert(id, Descriptor::inode(Slot(3))).unwrap();
        assert_eq!(idx.find_inode(id).unwrap(), Slot(3));
        assert!(idx.find_block(id).is_err());
        assert_eq!(idx.remove(id), Some(Descriptor::inode(Slot(3))));
        assert!(idx.find(id).is_none());
    }

    #[test]
    fn insert_rejects_duplicate() {
        let mut idx = Index::new();
        let id = Id::new(1);
        idx.insert(id, Descriptor::inode(Slot(0))).unwrap();
        assert_eq!(idx.insert(id, Descriptor::inode(Slot(1))), Err(Error::Exists));
    }

    #[test]
    fn collisions_in_same_bucket_resolve_independently() {
        let mut idx = Index::new();
        let a = Id::new(5);
        let b = Id::new(5 + BUCKET_COUNT as u32);
        idx.insert(a, Descriptor::inode(Slot(0))).unwrap();
        idx.insert(b, Descriptor::block(Slot(1))).unwrap();
        assert_eq!(idx.find_inode(a).unwrap(), Slot(0));
        assert_eq!(idx.find_block(b).unwrap(), Slot(1));
        idx.remove(a);
        assert!(idx.find(a).is_none());
        assert_eq!(idx.find_block(b).unwrap(), Slot(1));
    }
}
