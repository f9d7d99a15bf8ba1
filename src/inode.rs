//! Inode module: files and directories, sibling lists, block lists,
//! reference counting, rename, and delete (§4.3).
//!
//! The fixed short-name buffer below plays the role of the teacher's
//! `InodeFileMode`/`InodeNumber` newtypes (`src/fs/ext4/inode.rs`): a small
//! `Pod` value embedded directly in the in-RAM descriptor rather than a
//! heap-allocated `String`, since names are bounded to 16 bytes by the
//! on-disk format.

use core::cmp::Ordering;

use crate::block::{self, Block};
use crate::codec::{self, InodeRecord, MAX_NAME_LEN};
use crate::errors::Error;
use crate::flash::{Flash, FlashDevice};
use crate::ids::{AreaId, Id, InodeFlags, Seq};
use crate::index::{Descriptor, Index};
use crate::pool::{Pool, Slot};

/// A filename of at most [`MAX_NAME_LEN`] bytes, stored inline.
#[derive(Clone, Copy, Eq)]
pub struct ShortName {
    len: u8,
    bytes: [u8; MAX_NAME_LEN],
}

impl ShortName {
    pub const EMPTY: Self = Self {
        len: 0,
        bytes: [0; MAX_NAME_LEN],
    };

    pub fn from_bytes(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() > MAX_NAME_LEN {
            return Err(Error::InvalidArgument);
        }
        let mut bytes = [0u8; MAX_NAME_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            len: raw.len() as u8,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl PartialEq for ShortName {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl core::fmt::Debug for ShortName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => f.write_fmt(format_args!("{:?}", s)),
            Err(_) => f.write_fmt(format_args!("{:?}", self.as_bytes())),
        }
    }
}

/// Binary comparison of filename bytes; a shorter name sorts first on a
/// byte-for-byte tie. Used for RAM-side comparisons (against a literal path
/// token, or between two cached names) — the "RAM↔literal" variant of
/// §4.3's filename comparison.
pub fn compare_names(a: &[u8], b: &[u8]) -> Ordering {
    let common = a.len().min(b.len());
    match a[..common].cmp(&b[..common]) {
        Ordering::Equal => a.len().cmp(&b.len()),
        other => other,
    }
}

/// Flash↔flash filename comparison: decodes both inode records from their
/// on-disk location and compares their trailers. Used when sibling order is
/// rebuilt from disk during restore, where a cached RAM name is not always
/// available yet.
pub fn compare_names_on_disk<D: FlashDevice>(
    flash: &mut Flash<D>,
    a: (AreaId, u32),
    b: (AreaId, u32),
) -> Result<Ordering, Error> {
    let rec_a = read_disk(flash, a.0, a.1)?;
    let rec_b = read_disk(flash, b.0, b.1)?;
    Ok(compare_names(&rec_a.filename, &rec_b.filename))
}

/// In-RAM descriptor for an inode (file or directory).
#[derive(Clone, Debug)]
pub struct Inode {
    pub id: Id,
    pub seq: Seq,
    pub parent_id: Id,
    pub flags: InodeFlags,
    pub filename: ShortName,
    pub refcnt: u32,
    /// Cached sum of non-deleted block `data_len`s; meaningful for files.
    pub data_len: u32,
    pub area: AreaId,
    pub offset: u32,
    /// Next sibling within the parent's children list.
    pub next_sibling: Option<Slot>,
    /// Head of the children list (directories only).
    pub children: Option<Slot>,
    /// Head of the block list (files only).
    pub blocks: Option<Slot>,
}

impl Inode {
    pub fn is_directory(&self) -> bool {
        self.flags.contains(InodeFlags::DIRECTORY)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(InodeFlags::DELETED)
    }

    pub fn is_dummy(&self) -> bool {
        self.flags.contains(InodeFlags::DUMMY)
    }

    pub fn root() -> Self {
        Self {
            id: Id::ROOT,
            seq: Seq::ZERO,
            parent_id: Id::NONE,
            flags: InodeFlags::DIRECTORY,
            filename: ShortName::EMPTY,
            refcnt: 1,
            data_len: 0,
            area: AreaId::new(0),
            offset: 0,
            next_sibling: None,
            children: None,
            blocks: None,
        }
    }
}

pub fn alloc(pool: &mut Pool<Inode>, inode: Inode) -> Result<Slot, Error> {
    pool.alloc(inode)
}

pub fn free(pool: &mut Pool<Inode>, slot: Slot) -> Option<Inode> {
    pool.free(slot)
}

/// Decodes an inode record at `(area, offset)`.
pub fn read_disk<D: FlashDevice>(
    flash: &mut Flash<D>,
    area: AreaId,
    offset: u32,
) -> Result<InodeRecord, Error> {
    let mut header_buf = [0u8; codec::INODE_HEADER_LEN];
    flash.read(area, offset, &mut header_buf)?;
    let header: &codec::InodeRecordHeader =
        bytemuck::try_from_bytes(&header_buf).map_err(|_| Error::Corrupt)?;
    if header.magic != codec::INODE_MAGIC {
        return Err(Error::Corrupt);
    }
    let name_len = header.filename_len as usize;
    if name_len > MAX_NAME_LEN {
        return Err(Error::Corrupt);
    }
    let mut full = alloc::vec![0u8; codec::INODE_HEADER_LEN + name_len];
    full[..codec::INODE_HEADER_LEN].copy_from_slice(&header_buf);
    flash.read(
        area,
        offset + codec::INODE_HEADER_LEN as u32,
        &mut full[codec::INODE_HEADER_LEN..],
    )?;
    InodeRecord::decode(&full)
}

/// Serializes `record` and issues exactly one flash write.
pub fn write_disk<D: FlashDevice>(
    flash: &mut Flash<D>,
    record: &InodeRecord,
    area: AreaId,
    offset: u32,
) -> Result<(), Error> {
    let bytes = record.encode()?;
    flash.write(area, offset, &bytes)
}

/// Initializes an in-RAM inode from a decoded record and inserts it into
/// the index.
pub fn from_disk(
    pool: &mut Pool<Inode>,
    index: &mut Index,
    record: &InodeRecord,
    area: AreaId,
    offset: u32,
) -> Result<Slot, Error> {
    let filename = ShortName::from_bytes(&record.filename)?;
    let inode = Inode {
        id: record.id,
        seq: Seq::new(record.seq),
        parent_id: record.parent_id,
        flags: record.flags,
        filename,
        refcnt: 0,
        data_len: 0,
        area,
        offset,
        next_sibling: None,
        children: None,
        blocks: None,
    };
    let slot = pool.alloc(inode)?;
    index.insert(record.id, Descriptor::inode(slot))?;
    Ok(slot)
}

/// Enforces the name-length bound and writes a new record with `seq + 1`
/// under the new name; the child/block list is left untouched.
pub fn rename<D: FlashDevice>(
    flash: &mut Flash<D>,
    index: &mut Index,
    pool: &mut Pool<Inode>,
    slot: Slot,
    new_name: &[u8],
    new_area: AreaId,
    new_offset: u32,
) -> Result<(), Error> {
    if new_name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidArgument);
    }
    let inode = pool.get_mut(slot).ok_or(Error::NotFound)?;
    let next_seq = inode.seq.next();
    let record = InodeRecord {
        id: inode.id,
        seq: next_seq.get(),
        parent_id: inode.parent_id,
        flags: inode.flags,
        filename: new_name.to_vec(),
    };
    write_disk(flash, &record, new_area, new_offset)?;
    let id = inode.id;
    let inode = pool.get_mut(slot).ok_or(Error::NotFound)?;
    inode.seq = next_seq;
    inode.filename = ShortName::from_bytes(new_name)?;
    inode.area = new_area;
    inode.offset = new_offset;
    index.remove(id);
    index.insert(id, Descriptor::inode(slot))?;
    Ok(())
}

/// Writes a deleted-flag record superseding `inode`. Self-contained; no
/// in-place update of earlier records.
pub fn delete_from_disk<D: FlashDevice>(
    flash: &mut Flash<D>,
    inode: &Inode,
    area: AreaId,
    offset: u32,
) -> Result<(), Error> {
    let record = InodeRecord {
        id: inode.id,
        seq: inode.seq.next().get(),
        parent_id: inode.parent_id,
        flags: InodeFlags::DELETED | (inode.flags & InodeFlags::DIRECTORY),
        filename: inode.filename.as_bytes().to_vec(),
    };
    write_disk(flash, &record, area, offset)
}

/// Tears down `slot` in RAM: detaches it from its parent, then frees its
/// owned blocks (file) or recursively deletes its children (directory). If
/// `refcnt > 0`, the inode is marked dummy-deleted instead and teardown is
/// deferred to the last handle close (§4.9).
pub fn delete_from_ram(pool: &mut Pool<Inode>, index: &mut Index, blocks: &mut Pool<Block>, slot: Slot) {
    if let Some(inode) = pool.get(slot) {
        if inode.refcnt > 0 {
            if let Some(inode) = pool.get_mut(slot) {
                inode.flags.set(InodeFlags::DUMMY);
                inode.flags.set(InodeFlags::DELETED);
            }
            return;
        }
    } else {
        return;
    }
    teardown(pool, index, blocks, slot);
}

/// Unconditional teardown used once refcnt has reached zero, either
/// immediately or from `close`.
pub fn teardown(pool: &mut Pool<Inode>, index: &mut Index, blocks: &mut Pool<Block>, slot: Slot) {
    let Some(inode) = pool.get(slot).cloned() else {
        return;
    };
    if inode.is_directory() {
        let mut child = inode.children;
        while let Some(child_slot) = child {
            let next = pool.get(child_slot).and_then(|c| c.next_sibling);
            teardown(pool, index, blocks, child_slot);
            child = next;
        }
    } else if let Some(first) = inode.blocks {
        block::delete_list_from_ram(blocks, first);
    }
    index.remove(inode.id);
    pool.free(slot);
}

/// Inserts `child` into `parent`'s children list, ordered by ascending
/// filename. Rejects duplicate names within the directory.
pub fn add_child(pool: &mut Pool<Inode>, parent: Slot, child: Slot) -> Result<(), Error> {
    let child_name = pool.get(child).ok_or(Error::NotFound)?.filename;

    let mut prev: Option<Slot> = None;
    let mut cur = pool.get(parent).ok_or(Error::NotFound)?.children;
    while let Some(cur_slot) = cur {
        let node = pool.get(cur_slot).ok_or(Error::Corrupt)?;
        match compare_names(child_name.as_bytes(), node.filename.as_bytes()) {
            Ordering::Equal => return Err(Error::Exists),
            Ordering::Less => break,
            Ordering::Greater => {
                prev = Some(cur_slot);
                cur = node.next_sibling;
            }
        }
    }

    let parent_id = pool.get(parent).ok_or(Error::NotFound)?.id;
    let child_mut = pool.get_mut(child).ok_or(Error::NotFound)?;
    child_mut.next_sibling = cur;
    child_mut.parent_id = parent_id;
    match prev {
        Some(p) => pool.get_mut(p).ok_or(Error::Corrupt)?.next_sibling = Some(child),
        None => pool.get_mut(parent).ok_or(Error::NotFound)?.children = Some(child),
    }
    Ok(())
}

/// Removes `child` from `parent`'s children list.
pub fn remove_child(pool: &mut Pool<Inode>, parent: Slot, child: Slot) -> Result<(), Error> {
    let mut prev: Option<Slot> = None;
    let mut cur = pool.get(parent).ok_or(Error::NotFound)?.children;
    while let Some(cur_slot) = cur {
        if cur_slot == child {
            let next = pool.get(cur_slot).ok_or(Error::Corrupt)?.next_sibling;
            match prev {
                Some(p) => pool.get_mut(p).ok_or(Error::Corrupt)?.next_sibling = next,
                None => pool.get_mut(parent).ok_or(Error::NotFound)?.children = next,
            }
            pool.get_mut(child).ok_or(Error::Corrupt)?.next_sibling = None;
            return Ok(());
        }
        prev = Some(cur_slot);
        cur = pool.get(cur_slot).ok_or(Error::Corrupt)?.next_sibling;
    }
    Err(Error::NotFound)
}

/// Walks the block list summing `data_len` until reaching the block
/// containing `offset`. Returns `(prev, block, block_off)`. If `offset`
/// equals the file length, `block` is `None`.
pub fn seek(
    blocks: &Pool<Block>,
    inode: &Inode,
    offset: u32,
) -> Result<(Option<Slot>, Option<Slot>, u32), Error> {
    let mut prev = None;
    let mut cur = inode.blocks;
    let mut base = 0u32;
    while let Some(slot) = cur {
        let block = blocks.get(slot).ok_or(Error::Corrupt)?;
        if block.is_deleted() {
            prev = Some(slot);
            cur = block.next;
            continue;
        }
        let end = base + block.data_len as u32;
        if offset < end {
            return Ok((prev, Some(slot), offset - base));
        }
        base = end;
        prev = Some(slot);
        cur = block.next;
    }
    if offset == base {
        Ok((prev, None, 0))
    } else {
        Err(Error::InvalidArgument)
    }
}

/// Iterator over a directory's children, ordered by filename, mirroring the
/// teacher's `Ext4Directory: Iterator<Item = Ext4DirectoryEntry>`
/// (`src/fs/ext4/dir.rs`).
pub struct Children<'a> {
    pool: &'a Pool<Inode>,
    cur: Option<Slot>,
}

impl<'a> Iterator for Children<'a> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        let slot = self.cur?;
        self.cur = self.pool.get(slot).and_then(|n| n.next_sibling);
        Some(slot)
    }
}

/// Returns an iterator over `dir`'s children in ascending filename order.
pub fn children(pool: &Pool<Inode>, dir: Slot) -> Children<'_> {
    Children {
        pool,
        cur: pool.get(dir).and_then(|n| n.children),
    }
}

/// Recomputes `data_len` as the sum of non-deleted blocks' `data_len`.
pub fn calc_data_length(blocks: &Pool<Block>, inode: &Inode) -> u32 {
    let mut total = 0u32;
    let mut cur = inode.blocks;
    while let Some(slot) = cur {
        let Some(block) = blocks.get(slot) else {
            break;
        };
        if !block.is_deleted() {
            total += block.data_len as u32;
        }
        cur = block.next;
    }
    total
}
