//! Restore and format (§4.7, §4.8).
//!
//! Restore reconstructs the full in-RAM tree from unordered flash records:
//! read every area header, classify it, then linearly scan each live area's
//! record stream, letting the index's max-seq-wins rule (§4.2/§5) decide
//! which version of each id survives. This is the mirror image of GC's
//! forward streaming pass in `reserve.rs`, and the one place in the crate
//! that does decode raw bytes rather than trust in-RAM state, since at this
//! point there is no in-RAM state yet.

use alloc::vec::Vec;
use log::{debug, error, info, trace, warn};

use crate::block::{self, Block};
use crate::codec::{self, AreaHeaderRecord, BlockRecord, InodeRecord, AREA_HEADER_LEN};
use crate::errors::Error;
use crate::flash::{AreaDescriptor, Flash, FlashDevice};
use crate::ids::{AreaId, AreaSeq, BlockFlags, Id, InodeFlags, Rank, Seq};
use crate::index::{Descriptor, Index, ObjectKind};
use crate::inode::{Inode, ShortName};
use crate::pool::{Pool, Slot};
use crate::reserve::AreaState;

/// Classification of one area after reading its header.
enum AreaClass {
    Live(AreaHeaderRecord),
    Scratch,
    Uninitialized,
}

fn classify_area<D: FlashDevice>(flash: &mut Flash<D>, area: AreaId) -> AreaClass {
    let mut buf = [0u8; AREA_HEADER_LEN];
    if flash.read(area, 0, &mut buf).is_err() {
        return AreaClass::Uninitialized;
    }
    match AreaHeaderRecord::decode(&buf) {
        Ok(hdr) if hdr.is_scratch != 0 => AreaClass::Scratch,
        Ok(hdr) => AreaClass::Live(hdr),
        Err(_) => AreaClass::Uninitialized,
    }
}

/// Erases every area, designates the last one as scratch, and creates the
/// root directory inode in the first live area.
pub fn format_full<D: FlashDevice>(
    flash: &mut Flash<D>,
    descs: &[AreaDescriptor],
) -> Result<(Vec<AreaState>, Index, Pool<Inode>, Pool<Block>, u32), Error> {
    if descs.is_empty() || descs.len() > crate::flash::MAX_AREAS {
        return Err(Error::InvalidArgument);
    }
    let mut areas = Vec::with_capacity(descs.len());
    for (i, desc) in descs.iter().enumerate() {
        let area = AreaId::new(i as u16);
        let is_scratch = i + 1 == descs.len();
        format_area(flash, area, desc.length, AreaSeq::new(0), is_scratch)?;
        areas.push(AreaState {
            id: area,
            length: desc.length,
            cursor: AREA_HEADER_LEN as u32,
            seq: AreaSeq::new(0),
            is_scratch,
        });
    }

    let mut index = Index::new();
    let mut inodes: Pool<Inode> = Pool::with_capacity(256);
    let blocks: Pool<Block> = Pool::with_capacity(256);

    let root = Inode::root();
    let root_area = areas[0].id;
    let root_offset = areas[0].cursor;
    let record = InodeRecord {
        id: root.id,
        seq: root.seq.get(),
        parent_id: root.parent_id,
        flags: root.flags,
        filename: Vec::new(),
    };
    let bytes = record.encode()?;
    flash.write(root_area, root_offset, &bytes)?;
    areas[0].cursor += bytes.len() as u32;
    let mut root_ram = root;
    root_ram.area = root_area;
    root_ram.offset = root_offset;
    let slot = inodes.alloc(root_ram)?;
    index.insert(Id::ROOT, Descriptor::inode(slot))?;

    info!("format_full: {} areas, root inode written", descs.len());
    Ok((areas, index, inodes, blocks, 1))
}

/// Erases a single area and writes its header.
pub fn format_area<D: FlashDevice>(
    flash: &mut Flash<D>,
    area: AreaId,
    length: u32,
    seq: AreaSeq,
    is_scratch: bool,
) -> Result<(), Error> {
    flash.erase(area)?;
    let header = AreaHeaderRecord::new(length, seq, is_scratch);
    flash.write(area, 0, &header.encode())
}

/// Promotes `area` (currently scratch) to live and clears its user-data
/// region conceptually by leaving its existing records as the new live
/// content — used by GC, which already streamed the surviving records in
/// before calling this. Exposed for symmetry with §4.8's naming; the GC
/// path in `reserve.rs` inlines the same steps directly.
pub fn format_from_scratch_area<D: FlashDevice>(
    flash: &mut Flash<D>,
    area: AreaId,
    length: u32,
    seq: AreaSeq,
) -> Result<(), Error> {
    let header = AreaHeaderRecord::new(length, seq, false);
    flash.write(area, 0, &header.encode())
}

/// Scans every area and reconstructs in-RAM state. Never writes to flash
/// except to complete an interrupted scratch transition (area descriptor
/// table inconsistency is otherwise mount-fatal).
pub fn restore_full<D: FlashDevice>(
    flash: &mut Flash<D>,
    descs: &[AreaDescriptor],
) -> Result<(Vec<AreaState>, Index, Pool<Inode>, Pool<Block>, u32), Error> {
    if descs.is_empty() || descs.len() > crate::flash::MAX_AREAS {
        return Err(Error::InvalidArgument);
    }

    let mut areas = Vec::with_capacity(descs.len());
    let mut scratch_count = 0;
    for (i, desc) in descs.iter().enumerate() {
        let area = AreaId::new(i as u16);
        match classify_area(flash, area) {
            AreaClass::Live(hdr) => areas.push(AreaState {
                id: area,
                length: desc.length,
                cursor: AREA_HEADER_LEN as u32,
                seq: AreaSeq::new(hdr.seq),
                is_scratch: false,
            }),
            AreaClass::Scratch => {
                scratch_count += 1;
                areas.push(AreaState {
                    id: area,
                    length: desc.length,
                    cursor: AREA_HEADER_LEN as u32,
                    seq: AreaSeq::new(0),
                    is_scratch: true,
                });
            }
            AreaClass::Uninitialized => {
                error!("area {} has no valid header during restore", i);
                return format_full(flash, descs);
            }
        }
    }

    if scratch_count != 1 {
        warn!(
            "restore found {} scratch areas (want exactly 1); formatting from table",
            scratch_count
        );
        return format_full(flash, descs);
    }

    let mut index = Index::new();
    let mut inodes: Pool<Inode> = Pool::with_capacity(256);
    let mut blocks: Pool<Block> = Pool::with_capacity(256);
    let mut max_id = 0u32;

    for area_state in areas.iter_mut().filter(|a| !a.is_scratch) {
        let area = area_state.id;
        let length = area_state.length;
        let mut offset = AREA_HEADER_LEN as u32;
        loop {
            match scan_one_record(flash, area, offset, length) {
                Some((kind, size)) => {
                    apply_record(&mut index, &mut inodes, &mut blocks, area, offset, kind);
                    offset += size as u32;
                }
                None => break,
            }
        }
        area_state.cursor = offset;
    }

    index.foreach(|id, _| max_id = max_id.max(id.get()));

    reattach(&mut inodes, &mut blocks, &mut index);

    let root_slot = index.find_inode(Id::ROOT)?;
    if !inodes.get(root_slot).ok_or(Error::Corrupt)?.is_directory() {
        error!("restore: root inode is not a directory, mount-fatal");
        return Err(Error::Corrupt);
    }

    Ok((areas, index, inodes, blocks, max_id + 1))
}

/// One decoded record, tagged by kind, as seen during the restore scan.
enum ScannedRecord {
    Inode(InodeRecord),
    Block(BlockRecord),
}

/// Attempts to decode one record at `offset`. Returns `None` when the
/// region is undecodable (bad magic) or would run past the area, which
/// restore treats as end-of-records for that area.
fn scan_one_record<D: FlashDevice>(
    flash: &mut Flash<D>,
    area: AreaId,
    offset: u32,
    area_length: u32,
) -> Option<(ScannedRecord, usize)> {
    if offset >= area_length {
        return None;
    }
    let mut magic_buf = [0u8; 4];
    flash.read(area, offset, &mut magic_buf).ok()?;
    // Native-endian, matching bytemuck's transmute of the fixed header
    // (the crate targets little-endian hosts, consistent with §4.1).
    let magic = u32::from_ne_bytes(magic_buf);
    if magic == codec::INODE_MAGIC {
        let rec = crate::inode::read_disk(flash, area, offset).ok()?;
        let size = rec.on_disk_size();
        Some((ScannedRecord::Inode(rec), size))
    } else if magic == codec::BLOCK_MAGIC {
        let rec = block::read_disk(flash, area, offset).ok()?;
        let size = rec.on_disk_size();
        Some((ScannedRecord::Block(rec), size))
    } else {
        trace!("area {}: end of records at offset {}", area.get(), offset);
        None
    }
}

fn apply_record(
    index: &mut Index,
    inodes: &mut Pool<Inode>,
    blocks: &mut Pool<Block>,
    area: AreaId,
    offset: u32,
    record: ScannedRecord,
) {
    match record {
        ScannedRecord::Inode(rec) => apply_inode_record(index, inodes, area, offset, rec),
        ScannedRecord::Block(rec) => apply_block_record(index, blocks, area, offset, rec),
    }
}

fn apply_inode_record(
    index: &mut Index,
    inodes: &mut Pool<Inode>,
    area: AreaId,
    offset: u32,
    rec: InodeRecord,
) {
    match index.find(rec.id) {
        None => {
            if let Ok(filename) = ShortName::from_bytes(&rec.filename) {
                let inode = Inode {
                    id: rec.id,
                    seq: Seq::new(rec.seq),
                    parent_id: rec.parent_id,
                    flags: rec.flags,
                    filename,
                    refcnt: if rec.id == Id::ROOT { 1 } else { 0 },
                    data_len: 0,
                    area,
                    offset,
                    next_sibling: None,
                    children: None,
                    blocks: None,
                };
                if let Ok(slot) = inodes.alloc(inode) {
                    let _ = index.insert(rec.id, Descriptor::inode(slot));
                    debug!("restore: accepted inode {} seq {}", rec.id.get(), rec.seq);
                }
            }
        }
        Some(Descriptor {
            kind: ObjectKind::Inode,
            slot,
        }) => {
            let current_seq = inodes.get(slot).map(|n| n.seq.get()).unwrap_or(0);
            if rec.seq > current_seq {
                if let (Ok(filename), Some(node)) =
                    (ShortName::from_bytes(&rec.filename), inodes.get_mut(slot))
                {
                    node.seq = Seq::new(rec.seq);
                    node.parent_id = rec.parent_id;
                    node.flags = rec.flags;
                    node.filename = filename;
                    node.area = area;
                    node.offset = offset;
                    debug!("restore: superseded inode {} to seq {}", rec.id.get(), rec.seq);
                }
            } else {
                trace!("restore: ignored stale inode {} seq {}", rec.id.get(), rec.seq);
            }
        }
        Some(_) => {
            warn!("restore: id {} reused across object kinds, ignoring", rec.id.get());
        }
    }
}

fn apply_block_record(
    index: &mut Index,
    blocks: &mut Pool<Block>,
    area: AreaId,
    offset: u32,
    rec: BlockRecord,
) {
    match index.find(rec.id) {
        None => {
            let block = Block {
                id: rec.id,
                seq: Seq::new(rec.seq),
                rank: rec.rank,
                inode_id: rec.inode_id,
                flags: rec.flags,
                data_len: rec.data.len() as u16,
                area,
                offset,
                next: None,
            };
            if let Ok(slot) = blocks.alloc(block) {
                let _ = index.insert(rec.id, Descriptor::block(slot));
            }
        }
        Some(Descriptor {
            kind: ObjectKind::Block,
            slot,
        }) => {
            let current_seq = blocks.get(slot).map(|b| b.seq.get()).unwrap_or(0);
            if rec.seq > current_seq {
                if let Some(block) = blocks.get_mut(slot) {
                    block.seq = Seq::new(rec.seq);
                    block.rank = rec.rank;
                    block.inode_id = rec.inode_id;
                    block.flags = rec.flags;
                    block.data_len = rec.data.len() as u16;
                    block.area = area;
                    block.offset = offset;
                }
            }
        }
        Some(_) => {
            warn!("restore: id {} reused across object kinds, ignoring", rec.id.get());
        }
    }
}

/// Pass 2: reattach blocks to owning inodes by rank, attach inodes to
/// parents, recompute cached `data_len`, and drop anything that cannot
/// reach the root as an orphan.
fn reattach(inodes: &mut Pool<Inode>, blocks: &mut Pool<Block>, index: &mut Index) {
    // Attach blocks to inodes in ascending rank order.
    let inode_ids: Vec<(Slot, Id)> = inodes.iter().map(|(s, n)| (s, n.id)).collect();
    for (inode_slot, id) in &inode_ids {
        let mut owned: Vec<(Slot, Rank)> = blocks
            .iter()
            .filter(|(_, b)| b.inode_id == *id && !b.is_deleted())
            .map(|(s, b)| (s, b.rank))
            .collect();
        owned.sort_by_key(|(_, rank)| rank.get());
        for window in owned.windows(2) {
            let (slot, _) = window[0];
            let (next_slot, _) = window[1];
            if let Some(b) = blocks.get_mut(slot) {
                b.next = Some(next_slot);
            }
        }
        if let Some(first) = owned.first().map(|(s, _)| *s) {
            if let Some(node) = inodes.get_mut(*inode_slot) {
                node.blocks = Some(first);
            }
        }
        let data_len = owned
            .iter()
            .filter_map(|(s, _)| blocks.get(*s))
            .map(|b| b.data_len as u32)
            .sum();
        if let Some(node) = inodes.get_mut(*inode_slot) {
            node.data_len = data_len;
        }
    }

    // Attach inodes to their parent's children list, in ascending filename
    // order, skipping the root (parent is the NONE sentinel).
    let dir_children: Vec<(Slot, Id)> = inodes
        .iter()
        .filter(|(_, n)| n.id != Id::ROOT)
        .map(|(s, n)| (s, n.parent_id))
        .collect();
    for (child_slot, parent_id) in dir_children {
        if let Ok(parent_slot) = index.find_inode(parent_id) {
            let _ = crate::inode::add_child(inodes, parent_slot, child_slot);
        }
    }

    // Drop anything whose parent chain does not terminate at the root.
    let all_slots: Vec<Slot> = inodes.iter().map(|(s, _)| s).collect();
    let mut orphans = Vec::new();
    for slot in all_slots {
        if !chain_reaches_root(inodes, index, slot) {
            orphans.push(slot);
        }
    }
    for slot in orphans {
        if let Some(id) = inodes.get(slot).map(|n| n.id) {
            warn!("restore: inode {} orphaned, dropping", id.get());
            index.remove(id);
            inodes.free(slot);
        }
    }
}

fn chain_reaches_root(inodes: &Pool<Inode>, index: &Index, slot: Slot) -> bool {
    let mut cur = slot;
    let limit = inodes.len() + 1;
    for _ in 0..limit {
        let Some(node) = inodes.get(cur) else {
            return false;
        };
        if node.id == Id::ROOT {
            return true;
        }
        match index.find_inode(node.parent_id) {
            Ok(parent_slot) => cur = parent_slot,
            Err(_) => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RamFlash;

    #[test]
    fn format_then_restore_recovers_root() {
        let descs = [AreaDescriptor::new(0, 4096), AreaDescriptor::new(4096, 4096)];
        let mut flash = Flash::new(RamFlash::new(&descs), &descs);
        let (areas, index, inodes, _blocks, next_id) = format_full(&mut flash, &descs).unwrap();
        assert_eq!(areas.len(), 2);
        assert_eq!(next_id, 1);
        let root = index.find_inode(Id::ROOT).unwrap();
        assert!(inodes.get(root).unwrap().is_directory());

        let (_areas2, index2, inodes2, _blocks2, _next_id2) =
            restore_full(&mut flash, &descs).unwrap();
        let root2 = index2.find_inode(Id::ROOT).unwrap();
        assert!(inodes2.get(root2).unwrap().is_directory());
    }

    #[test]
    fn restore_is_idempotent() {
        let descs = [AreaDescriptor::new(0, 4096), AreaDescriptor::new(4096, 4096)];
        let mut flash = Flash::new(RamFlash::new(&descs), &descs);
        format_full(&mut flash, &descs).unwrap();
        let (_a1, idx1, _i1, _b1, n1) = restore_full(&mut flash, &descs).unwrap();
        let (_a2, idx2, _i2, _b2, n2) = restore_full(&mut flash, &descs).unwrap();
        assert_eq!(n1, n2);
        let mut ids1 = Vec::new();
        idx1.foreach(|id, _| ids1.push(id.get()));
        let mut ids2 = Vec::new();
        idx2.foreach(|id, _| ids2.push(id.get()));
        ids1.sort();
        ids2.sort();
        assert_eq!(ids1, ids2);
    }

    /// Invariant 3 (§8): the index holds exactly one entry per live id, and
    /// that entry resolves to the highest-seq record seen during the scan.
    #[test]
    fn restore_keeps_highest_seq_version_of_duplicate_records() {
        let descs = [AreaDescriptor::new(0, 4096), AreaDescriptor::new(4096, 4096)];
        let mut flash = Flash::new(RamFlash::new(&descs), &descs);
        let (mut areas, _index, _inodes, _blocks, _next_id) = format_full(&mut flash, &descs).unwrap();

        // Append a second, superseding root record directly, as if a rename
        // had landed before the in-RAM state this test restores from scratch.
        let area = areas[0].id;
        let offset = areas[0].cursor;
        let record = InodeRecord {
            id: Id::ROOT,
            seq: 1,
            parent_id: Id::NONE,
            flags: InodeFlags::DIRECTORY,
            filename: Vec::new(),
        };
        let bytes = record.encode().unwrap();
        flash.write(area, offset, &bytes).unwrap();
        areas[0].cursor += bytes.len() as u32;

        let (_areas2, index2, inodes2, _blocks2, _next_id2) = restore_full(&mut flash, &descs).unwrap();

        let mut count = 0;
        index2.foreach(|id, _| {
            if id == Id::ROOT {
                count += 1;
            }
        });
        assert_eq!(count, 1, "index must hold exactly one entry per live id");

        let slot = index2.find_inode(Id::ROOT).unwrap();
        assert_eq!(inodes2.get(slot).unwrap().seq.get(), 1, "must keep the max-seq version");
    }
}
