//! Space reservation & garbage collection — the critical algorithm (§4.6).
//!
//! GC's "drop superseded/deleted records" predicate is implemented by
//! driving the copy from the in-RAM index and pools rather than re-decoding
//! raw bytes from the victim area: an object's `area`/`offset` fields always
//! point at its current, non-superseded record (writers update them the
//! moment a new version lands), so walking live, non-deleted pool entries
//! whose `area` is the victim *is* exactly the set of records a raw scan
//! would keep. This avoids a second on-disk record parser for the same
//! decision the write path already encodes in RAM.

use alloc::vec::Vec;
use log::{info, warn};

use crate::block::Block;
use crate::codec::{AreaHeaderRecord, AREA_HEADER_LEN, BLOCK_HEADER_LEN, INODE_HEADER_LEN};
use crate::errors::Error;
use crate::flash::{Flash, FlashDevice};
use crate::ids::{AreaId, AreaSeq};
use crate::index::{Descriptor, Index};
use crate::inode::Inode;
use crate::pool::Pool;

/// Mutable bookkeeping for one area: write cursor, generation, scratch bit.
#[derive(Clone, Copy, Debug)]
pub struct AreaState {
    pub id: AreaId,
    pub length: u32,
    pub cursor: u32,
    pub seq: AreaSeq,
    pub is_scratch: bool,
}

impl AreaState {
    pub fn free(&self) -> u32 {
        self.length - self.cursor
    }
}

/// Scans live (non-scratch) areas once for the first with enough
/// contiguous trailing free space.
fn scan_for_space(areas: &[AreaState], size: usize) -> Option<usize> {
    areas
        .iter()
        .position(|a| !a.is_scratch && a.free() as usize >= size)
}

/// Allocates `size` contiguous bytes for one record. Runs GC once if no
/// live area currently has room; fails with [`Error::Full`] if GC cannot
/// free enough.
pub fn reserve_space<D: FlashDevice>(
    flash: &mut Flash<D>,
    areas: &mut [AreaState],
    index: &mut Index,
    inodes: &mut Pool<Inode>,
    blocks: &mut Pool<Block>,
    size: usize,
) -> Result<(AreaId, u32), Error> {
    if let Some(i) = scan_for_space(areas, size) {
        let offset = areas[i].cursor;
        areas[i].cursor += size as u32;
        return Ok((areas[i].id, offset));
    }
    warn!("reservation of {} bytes falling back to GC", size);
    gc_until(flash, areas, index, inodes, blocks, size)?;
    match scan_for_space(areas, size) {
        Some(i) => {
            let offset = areas[i].cursor;
            areas[i].cursor += size as u32;
            Ok((areas[i].id, offset))
        }
        None => Err(Error::Full),
    }
}

/// Runs GC, victim by victim, until an area has `size` bytes free or every
/// live area has been compacted once without success.
fn gc_until<D: FlashDevice>(
    flash: &mut Flash<D>,
    areas: &mut [AreaState],
    index: &mut Index,
    inodes: &mut Pool<Inode>,
    blocks: &mut Pool<Block>,
    size: usize,
) -> Result<(), Error> {
    let attempts = areas.iter().filter(|a| !a.is_scratch).count().max(1);
    for _ in 0..attempts {
        if scan_for_space(areas, size).is_some() {
            return Ok(());
        }
        let reclaimed = gc_one_area(flash, areas, index, inodes, blocks)?;
        if reclaimed == 0 {
            break;
        }
    }
    if scan_for_space(areas, size).is_some() {
        Ok(())
    } else {
        Err(Error::Full)
    }
}

/// Garbage-collects the oldest non-scratch area into the scratch area,
/// promotes the scratch to live, and turns the old victim into the new
/// scratch. Returns the number of bytes reclaimed.
fn gc_one_area<D: FlashDevice>(
    flash: &mut Flash<D>,
    areas: &mut [AreaState],
    index: &mut Index,
    inodes: &mut Pool<Inode>,
    blocks: &mut Pool<Block>,
) -> Result<u32, Error> {
    let victim_idx = areas
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_scratch)
        .min_by_key(|(_, a)| (a.seq.get(), a.id.get()))
        .map(|(i, _)| i)
        .ok_or(Error::Full)?;
    let scratch_idx = areas
        .iter()
        .position(|a| a.is_scratch)
        .ok_or(Error::Corrupt)?;

    let victim_id = areas[victim_idx].id;
    let scratch_id = areas[scratch_idx].id;
    // Total bytes the victim held (live + dead) before this pass; compared
    // against what's actually rewritten below to get bytes reclaimed.
    let victim_used_before = areas[victim_idx].cursor;

    // Records start right after the area header, which occupies the start
    // of the area (offset 0..AREA_HEADER_LEN) and is written last below.
    let mut write_cursor = AREA_HEADER_LEN as u32;

    // Stream live inode records byte-for-byte from their current location;
    // none of an inode record's on-disk bytes change across a GC pass, only
    // its area/offset do.
    let live_inodes: Vec<_> = inodes
        .iter()
        .filter(|(_, n)| n.area == victim_id && !n.is_deleted())
        .map(|(slot, n)| (slot, n.id, n.offset, INODE_HEADER_LEN + n.filename.as_bytes().len()))
        .collect();
    for (slot, id, src_offset, size) in live_inodes {
        flash.copy(victim_id, src_offset, scratch_id, write_cursor, size)?;
        let offset = write_cursor;
        write_cursor += size as u32;
        let node = inodes.get_mut(slot).ok_or(Error::Corrupt)?;
        node.area = scratch_id;
        node.offset = offset;
        index.remove(id);
        index.insert(id, Descriptor::inode(slot))?;
    }

    // Stream live block records the same way: a raw byte copy of header +
    // payload, since nothing in a block record changes across a GC pass.
    let live_blocks: Vec<_> = blocks
        .iter()
        .filter(|(_, b)| b.area == victim_id && !b.is_deleted())
        .map(|(slot, b)| (slot, b.id, b.offset, BLOCK_HEADER_LEN + b.data_len as usize))
        .collect();
    for (slot, id, src_offset, size) in live_blocks {
        flash.copy(victim_id, src_offset, scratch_id, write_cursor, size)?;
        let offset = write_cursor;
        write_cursor += size as u32;
        let node = blocks.get_mut(slot).ok_or(Error::Corrupt)?;
        node.area = scratch_id;
        node.offset = offset;
        index.remove(id);
        index.insert(id, Descriptor::block(slot))?;
    }

    let reclaimed = victim_used_before.saturating_sub(write_cursor);

    // Promote scratch to live: header write last, per the crash-safety
    // ordering in §4.6 step 3.
    let new_seq = areas[victim_idx].seq.next();
    let header = AreaHeaderRecord::new(areas[scratch_idx].length, new_seq, false);
    flash.write(scratch_id, 0, &header.encode())?;
    areas[scratch_idx].cursor = write_cursor;
    areas[scratch_idx].seq = new_seq;
    areas[scratch_idx].is_scratch = false;

    // Erase the victim and turn it into the new scratch.
    flash.erase(victim_id)?;
    let scratch_header = AreaHeaderRecord::new(areas[victim_idx].length, areas[victim_idx].seq, true);
    flash.write(victim_id, 0, &scratch_header.encode())?;
    areas[victim_idx].cursor = AREA_HEADER_LEN as u32;
    areas[victim_idx].is_scratch = true;

    info!(
        "gc: area {} -> scratch {}, reclaimed {} bytes",
        victim_id.get(),
        scratch_id.get(),
        reclaimed
    );
    if reclaimed == 0 {
        warn!("gc reclaimed zero bytes from area {}", victim_id.get());
    }
    Ok(reclaimed)
}

/// Breaks a multi-area write into block-sized reservations; a single
/// payload never spans areas (§4.6). Callers chunk `data` themselves into
/// `FFS_BLOCK_DATA_LEN`-sized pieces and call `reserve_space` once per
/// chunk — this helper documents that contract for `handle.rs`.
pub fn next_chunk_size(remaining: usize) -> usize {
    remaining.min(crate::codec::FFS_BLOCK_DATA_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::INODE_HEADER_LEN;
    use crate::flash::AreaDescriptor;
    use crate::restore::{format_full, restore_full};
    use crate::testutil::RamFlash;

    /// Invariant 5 (§8): a power cut between a successful `reserve_space`
    /// and the write it was reserved for must leave restore indistinguishable
    /// from the operation never having started. The reserved-but-unwritten
    /// region is still the area's erased fill, decodes as bad magic, and
    /// restore's scan simply stops before it.
    #[test]
    fn reserve_without_following_write_is_invisible_to_restore() {
        let descs = [AreaDescriptor::new(0, 4096), AreaDescriptor::new(4096, 4096)];
        let mut flash = Flash::new(RamFlash::new(&descs), &descs);
        let (mut areas, mut index, mut inodes, mut blocks, _next_id) =
            format_full(&mut flash, &descs).unwrap();

        let (_areas1, index1, _inodes1, _blocks1, next_id1) =
            restore_full(&mut flash, &descs).unwrap();
        let mut ids_before = Vec::new();
        index1.foreach(|id, _| ids_before.push(id.get()));

        // Reserve space for a new inode record, then crash before the write
        // that would have landed there ever happens.
        reserve_space(
            &mut flash,
            &mut areas,
            &mut index,
            &mut inodes,
            &mut blocks,
            INODE_HEADER_LEN + 3,
        )
        .unwrap();

        let (_areas2, index2, _inodes2, _blocks2, next_id2) =
            restore_full(&mut flash, &descs).unwrap();
        let mut ids_after = Vec::new();
        index2.foreach(|id, _| ids_after.push(id.get()));
        ids_before.sort();
        ids_after.sort();

        assert_eq!(
            ids_before, ids_after,
            "an unwritten reservation must not surface as a new object after restore"
        );
        assert_eq!(next_id1, next_id2, "next_id is only derived from records actually found on disk");
    }
}
