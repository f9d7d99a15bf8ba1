//! Block module: lifecycle of file data extents (§4.4).
//!
//! Blocks never keep their payload in RAM — only the metadata needed to
//! find the record again on flash and to walk the file's block list. This
//! mirrors the teacher's own `Ext4DirectoryEntry`, which keeps a handle back
//! to the owning filesystem and re-reads bytes from the device rather than
//! caching a whole directory's content in RAM (`src/fs/ext4/dir.rs`).

use alloc::vec::Vec;

use crate::codec::{self, BlockRecord, FFS_BLOCK_DATA_LEN};
use crate::errors::Error;
use crate::flash::{Flash, FlashDevice};
use crate::ids::{AreaId, BlockFlags, Id, Rank, Seq};
use crate::pool::{Pool, Slot};

/// In-RAM descriptor for a block: where it lives on flash, and its place in
/// the owning file's singly-linked block list.
#[derive(Clone, Copy, Debug)]
pub struct Block {
    pub id: Id,
    pub seq: Seq,
    pub rank: Rank,
    pub inode_id: Id,
    pub flags: BlockFlags,
    pub data_len: u16,
    pub area: AreaId,
    pub offset: u32,
    pub next: Option<Slot>,
}

impl Block {
    pub fn disk_size(&self) -> usize {
        codec::BLOCK_HEADER_LEN + self.data_len as usize
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(BlockFlags::DELETED)
    }
}

pub fn alloc(pool: &mut Pool<Block>, block: Block) -> Result<Slot, Error> {
    pool.alloc(block)
}

pub fn free(pool: &mut Pool<Block>, slot: Slot) -> Option<Block> {
    pool.free(slot)
}

/// Decodes a block record at `(area, offset)`. Fails with [`Error::Corrupt`]
/// on bad magic, truncated trailer, or checksum mismatch.
pub fn read_disk<D: FlashDevice>(
    flash: &mut Flash<D>,
    area: AreaId,
    offset: u32,
) -> Result<BlockRecord, Error> {
    let mut header_buf = [0u8; codec::BLOCK_HEADER_LEN];
    flash.read(area, offset, &mut header_buf)?;
    let header: &codec::BlockRecordHeader =
        bytemuck::try_from_bytes(&header_buf).map_err(|_| Error::Corrupt)?;
    if header.magic != codec::BLOCK_MAGIC {
        return Err(Error::Corrupt);
    }
    let data_len = header.data_len as usize;
    if data_len > FFS_BLOCK_DATA_LEN {
        return Err(Error::Corrupt);
    }
    let mut full = Vec::with_capacity(codec::BLOCK_HEADER_LEN + data_len);
    full.extend_from_slice(&header_buf);
    full.resize(codec::BLOCK_HEADER_LEN + data_len, 0);
    flash.read(area, offset + codec::BLOCK_HEADER_LEN as u32, &mut full[codec::BLOCK_HEADER_LEN..])?;
    BlockRecord::decode(&full)
}

/// Serializes `record` and issues exactly one flash write at `(area, offset)`.
pub fn write_disk<D: FlashDevice>(
    flash: &mut Flash<D>,
    record: &BlockRecord,
    area: AreaId,
    offset: u32,
) -> Result<(), Error> {
    let bytes = record.encode()?;
    flash.write(area, offset, &bytes)
}

/// Writes a header-only deleted record superseding `block`, per §4.4.
pub fn delete_from_disk<D: FlashDevice>(
    flash: &mut Flash<D>,
    block: &Block,
    area: AreaId,
    offset: u32,
) -> Result<(), Error> {
    let record = BlockRecord {
        id: block.id,
        seq: block.seq.next().get(),
        rank: block.rank,
        inode_id: block.inode_id,
        flags: BlockFlags::DELETED,
        data: Vec::new(),
    };
    write_disk(flash, &record, area, offset)
}

/// Bulk-deletes the block list starting at `first`, writing a deleted
/// record for every block in RAM (unlinking and freeing pool slots happens
/// separately via [`delete_list_from_ram`]). Used when truncating or
/// unlinking a file.
pub fn delete_list_from_disk<D: FlashDevice>(
    flash: &mut Flash<D>,
    areas: &mut [crate::reserve::AreaState],
    index: &mut crate::index::Index,
    inodes: &mut Pool<crate::inode::Inode>,
    pool: &mut Pool<Block>,
    first: Slot,
) -> Result<(), Error> {
    let mut cur = Some(first);
    while let Some(slot) = cur {
        let block = *pool.get(slot).ok_or(Error::Corrupt)?;
        let (area, offset) =
            crate::reserve::reserve_space(flash, areas, index, inodes, pool, codec::BLOCK_HEADER_LEN)?;
        delete_from_disk(flash, &block, area, offset)?;
        cur = block.next;
    }
    Ok(())
}

pub fn delete_list_from_ram(pool: &mut Pool<Block>, first: Slot) {
    let mut cur = Some(first);
    while let Some(slot) = cur {
        let next = pool.get(slot).and_then(|b| b.next);
        pool.free(slot);
        cur = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_size_accounts_for_header() {
        let block = Block {
            id: Id::new(1),
            seq: Seq::ZERO,
            rank: Rank::FIRST,
            inode_id: Id::new(2),
            flags: BlockFlags::EMPTY,
            data_len: 10,
            area: AreaId::new(0),
            offset: 0,
            next: None,
        };
        assert_eq!(block.disk_size(), codec::BLOCK_HEADER_LEN + 10);
    }
}
