//! File handle & I/O (§4.9): open/seek/close, position-addressed read, and
//! chunked `write_to_file`.

use alloc::vec::Vec;

use crate::block::{self, Block};
use crate::codec::{BlockRecord, FFS_BLOCK_DATA_LEN};
use crate::errors::Error;
use crate::flash::{Flash, FlashDevice};
use crate::ids::{BlockFlags, Id, Rank, Seq};
use crate::index::{Descriptor, Index};
use crate::inode::{self, Inode};
use crate::pool::{Pool, Slot};
use crate::reserve::{self, AreaState};

/// Access flags accepted by `open`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenFlags(pub u8);

impl OpenFlags {
    pub const READ: Self = Self(1 << 0);
    pub const WRITE: Self = Self(1 << 1);
    pub const APPEND: Self = Self(1 << 2);
    pub const TRUNCATE: Self = Self(1 << 3);
    pub const CREATE: Self = Self(1 << 4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for OpenFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An open file handle: which inode it refers to and the current I/O
/// position.
#[derive(Clone, Copy, Debug)]
pub struct Handle {
    pub inode: Slot,
    pub offset: u32,
    pub flags: OpenFlags,
}

/// Bounds-checks and stores a new position on the handle.
pub fn seek(inodes: &Pool<Inode>, blocks: &Pool<Block>, handle: &mut Handle, offset: u32) -> Result<(), Error> {
    let inode = inodes.get(handle.inode).ok_or(Error::NotFound)?;
    let len = inode.data_len;
    if offset > len {
        return Err(Error::InvalidArgument);
    }
    let _ = blocks;
    handle.offset = offset;
    Ok(())
}

/// Reads up to `buf.len()` bytes starting at the handle's position,
/// delegating to `inode::seek`/walking consecutive blocks, and advances the
/// position by the number of bytes actually read.
pub fn read<D: FlashDevice>(
    flash: &mut Flash<D>,
    inodes: &Pool<Inode>,
    blocks: &Pool<Block>,
    handle: &mut Handle,
    buf: &mut [u8],
) -> Result<usize, Error> {
    if !handle.flags.contains(OpenFlags::READ) {
        return Err(Error::AccessDenied);
    }
    let inode = inodes.get(handle.inode).ok_or(Error::NotFound)?;
    let (_, mut cur, mut block_off) = inode::seek(blocks, inode, handle.offset)?;
    let mut written = 0usize;
    while written < buf.len() {
        let Some(slot) = cur else { break };
        let block = blocks.get(slot).ok_or(Error::Corrupt)?;
        let avail = block.data_len as u32 - block_off;
        let want = (buf.len() - written).min(avail as usize);
        if want > 0 {
            let mut chunk = alloc::vec![0u8; want];
            flash.read(
                block.area,
                block.offset + crate::codec::BLOCK_HEADER_LEN as u32 + block_off,
                &mut chunk,
            )?;
            buf[written..written + want].copy_from_slice(&chunk);
            written += want;
        }
        block_off = 0;
        cur = block.next;
    }
    handle.offset += written as u32;
    Ok(written)
}

/// Chunks `data` into block payloads of at most [`FFS_BLOCK_DATA_LEN`]
/// bytes. A write that lands inside an existing block splices the new
/// bytes into that block's payload and rewrites it under the same id with
/// `seq + 1`; a write reaching the end of the block list appends new
/// blocks instead.
#[allow(clippy::too_many_arguments)]
pub fn write_to_file<D: FlashDevice>(
    flash: &mut Flash<D>,
    areas: &mut [AreaState],
    index: &mut Index,
    inodes: &mut Pool<Inode>,
    blocks: &mut Pool<Block>,
    next_id: &mut u32,
    handle: &mut Handle,
    data: &[u8],
) -> Result<usize, Error> {
    if !handle.flags.contains(OpenFlags::WRITE) {
        return Err(Error::AccessDenied);
    }
    let inode_id = inodes.get(handle.inode).ok_or(Error::NotFound)?.id;
    let mut pos = if handle.flags.contains(OpenFlags::APPEND) {
        inodes.get(handle.inode).ok_or(Error::NotFound)?.data_len
    } else {
        handle.offset
    };
    let mut written = 0usize;

    while written < data.len() {
        let (prev_slot, block_opt, block_off) = {
            let inode = inodes.get(handle.inode).ok_or(Error::NotFound)?;
            inode::seek(blocks, inode, pos)?
        };

        match block_opt {
            Some(slot) => {
                // Splice into the existing block, preserving the bytes
                // outside [block_off, block_off + want).
                let existing = *blocks.get(slot).ok_or(Error::Corrupt)?;
                let want = (data.len() - written).min(existing.data_len as usize - block_off as usize);
                let mut payload = alloc::vec![0u8; existing.data_len as usize];
                flash.read(
                    existing.area,
                    existing.offset + crate::codec::BLOCK_HEADER_LEN as u32,
                    &mut payload,
                )?;
                payload[block_off as usize..block_off as usize + want]
                    .copy_from_slice(&data[written..written + want]);

                let next_seq = existing.seq.next();
                let record = BlockRecord {
                    id: existing.id,
                    seq: next_seq.get(),
                    rank: existing.rank,
                    inode_id,
                    flags: BlockFlags::EMPTY,
                    data: payload,
                };
                let size = record.on_disk_size();
                let (area, area_offset) = reserve::reserve_space(flash, areas, index, inodes, blocks, size)?;
                block::write_disk(flash, &record, area, area_offset)?;

                let updated = blocks.get_mut(slot).ok_or(Error::Corrupt)?;
                updated.seq = next_seq;
                updated.area = area;
                updated.offset = area_offset;
                index.remove(existing.id);
                index.insert(existing.id, Descriptor::block(slot))?;

                written += want;
                pos += want as u32;
            }
            None => {
                // Append a brand-new block at the next rank.
                let chunk_len = crate::reserve::next_chunk_size(data.len() - written);
                let chunk = &data[written..written + chunk_len];
                let rank = match prev_slot {
                    Some(slot) => blocks.get(slot).ok_or(Error::Corrupt)?.rank.next(),
                    None => Rank::FIRST,
                };
                let id = Id::new(*next_id);
                *next_id += 1;

                let record = BlockRecord {
                    id,
                    seq: Seq::ZERO.get(),
                    rank,
                    inode_id,
                    flags: BlockFlags::EMPTY,
                    data: chunk.to_vec(),
                };
                let size = record.on_disk_size();
                let (area, area_offset) = reserve::reserve_space(flash, areas, index, inodes, blocks, size)?;
                block::write_disk(flash, &record, area, area_offset)?;

                let new_block = Block {
                    id,
                    seq: Seq::ZERO,
                    rank,
                    inode_id,
                    flags: BlockFlags::EMPTY,
                    data_len: chunk_len as u16,
                    area,
                    offset: area_offset,
                    next: None,
                };
                let slot = blocks.alloc(new_block)?;
                index.insert(id, Descriptor::block(slot))?;
                match prev_slot {
                    Some(p) => blocks.get_mut(p).ok_or(Error::Corrupt)?.next = Some(slot),
                    None => inodes.get_mut(handle.inode).ok_or(Error::NotFound)?.blocks = Some(slot),
                }

                written += chunk_len;
                pos += chunk_len as u32;
            }
        }
    }

    if let Some(inode) = inodes.get_mut(handle.inode) {
        inode.data_len = inode.data_len.max(pos);
    }
    handle.offset = pos;
    Ok(written)
}

/// Decrements `refcnt`; if it reaches zero and the inode is dummy-deleted,
/// tears down its block list and frees it.
pub fn close(
    inodes: &mut Pool<Inode>,
    index: &mut Index,
    blocks: &mut Pool<Block>,
    handle: Handle,
) {
    let Some(inode) = inodes.get_mut(handle.inode) else {
        return;
    };
    inode.refcnt = inode.refcnt.saturating_sub(1);
    let should_teardown = inode.refcnt == 0 && inode.is_dummy();
    if should_teardown {
        inode::teardown(inodes, index, blocks, handle.inode);
    }
}
