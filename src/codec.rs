//! On-disk record framing: area headers, inode records, block records.
//!
//! Fixed portions are `#[repr(C, packed)]` `Pod + Zeroable` structs decoded
//! with `bytemuck::{bytes_of, try_from_bytes}`, the same transmute-based
//! convention the teacher uses throughout `src/fs/ext4/` (e.g.
//! `bitmap.rs`'s `validate_chksum`, `dir.rs`'s raw directory-entry parsing).
//! Only the genuinely variable-length trailers (filenames, block data) are
//! handled by manual byte slicing, since their length is not known until the
//! fixed header has already been decoded.

use alloc::vec::Vec;
use bytemuck::{bytes_of, Pod, Zeroable};

use crate::errors::Error;
use crate::ids::{AreaSeq, BlockFlags, Id, InodeFlags, Rank};

/// The 4-word area magic from §6.
pub const AREA_MAGIC: [u32; 4] = [0xb98a31e2, 0x7fb0428c, 0xace08253, 0xb185fc8e];
pub const INODE_MAGIC: u32 = 0x925f_8bc0;
pub const BLOCK_MAGIC: u32 = 0x53ba_23b9;

/// Short filename bound, inclusive (§9 open question: accept exactly 16).
pub const MAX_NAME_LEN: usize = 16;

/// On-disk total size of a block record (header + data), per §6.
pub const BLOCK_TOTAL_SIZE: usize = 512;

pub const BLOCK_HEADER_LEN: usize = core::mem::size_of::<BlockRecordHeader>();

/// Max `data_len` of a single block record: `512 - header`, per the Block
/// entity invariant in the data model.
pub const FFS_BLOCK_DATA_LEN: usize = BLOCK_TOTAL_SIZE - BLOCK_HEADER_LEN;

/// Max staging buffer for a single `write_to_file`/`read` call, distinct
/// from the per-record on-disk bound above (§6: "max in-memory block data
/// payload 2048 bytes").
pub const MAX_IO_CHUNK: usize = 2048;

pub const INODE_HEADER_LEN: usize = core::mem::size_of::<InodeRecordHeader>();

pub const AREA_HEADER_LEN: usize = core::mem::size_of::<AreaHeaderRecord>();

/// Fixed portion of an area header record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct AreaHeaderRecord {
    pub magic: [u32; 4],
    pub length: u32,
    pub reserved: u16,
    pub seq: u8,
    pub is_scratch: u8,
}

impl AreaHeaderRecord {
    pub fn new(length: u32, seq: AreaSeq, is_scratch: bool) -> Self {
        Self {
            magic: AREA_MAGIC,
            length,
            reserved: 0,
            seq: seq.get(),
            is_scratch: is_scratch as u8,
        }
    }

    pub fn is_valid_magic(&self) -> bool {
        self.magic == AREA_MAGIC
    }

    pub fn encode(&self) -> Vec<u8> {
        bytes_of(self).to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let rec: &Self = bytemuck::try_from_bytes(buf).map_err(|_| Error::Corrupt)?;
        if !rec.is_valid_magic() {
            return Err(Error::Corrupt);
        }
        Ok(*rec)
    }
}

/// Fixed portion of an inode record; `filename` is the variable trailer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct InodeRecordHeader {
    pub magic: u32,
    pub id: u32,
    pub seq: u32,
    pub parent_id: u32,
    pub flags: u16,
    pub filename_len: u8,
    pub ecc: u32,
}

/// A decoded inode record: fixed header plus the filename trailer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InodeRecord {
    pub id: Id,
    pub seq: u32,
    pub parent_id: Id,
    pub flags: InodeFlags,
    pub filename: Vec<u8>,
}

impl InodeRecord {
    pub fn on_disk_size(&self) -> usize {
        INODE_HEADER_LEN + self.filename.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        if self.filename.len() > MAX_NAME_LEN {
            return Err(Error::InvalidArgument);
        }
        let header = InodeRecordHeader {
            magic: INODE_MAGIC,
            id: self.id.get(),
            seq: self.seq,
            parent_id: self.parent_id.get(),
            flags: self.flags.0,
            filename_len: self.filename.len() as u8,
            // Reserved for a later integrity check; always written as a
            // placeholder and ignored on read (§4.1).
            ecc: 0,
        };
        let mut out = Vec::with_capacity(self.on_disk_size());
        out.extend_from_slice(bytes_of(&header));
        out.extend_from_slice(&self.filename);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < INODE_HEADER_LEN {
            return Err(Error::Corrupt);
        }
        let header: &InodeRecordHeader =
            bytemuck::try_from_bytes(&buf[..INODE_HEADER_LEN]).map_err(|_| Error::Corrupt)?;
        if header.magic != INODE_MAGIC {
            return Err(Error::Corrupt);
        }
        let name_len = header.filename_len as usize;
        if name_len > MAX_NAME_LEN || buf.len() < INODE_HEADER_LEN + name_len {
            return Err(Error::Corrupt);
        }
        // `ecc` is reserved, not yet a real checksum; ignored on read (§4.1).
        Ok(Self {
            id: Id::new(header.id),
            seq: header.seq,
            parent_id: Id::new(header.parent_id),
            flags: InodeFlags(header.flags),
            filename: buf[INODE_HEADER_LEN..INODE_HEADER_LEN + name_len].to_vec(),
        })
    }
}

/// Fixed portion of a block record; `data` is the variable trailer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct BlockRecordHeader {
    pub magic: u32,
    pub id: u32,
    pub seq: u32,
    pub rank: u32,
    pub inode_id: u32,
    pub reserved: u16,
    pub flags: u16,
    pub data_len: u16,
    pub ecc: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub id: Id,
    pub seq: u32,
    pub rank: Rank,
    pub inode_id: Id,
    pub flags: BlockFlags,
    pub data: Vec<u8>,
}

impl BlockRecord {
    pub fn on_disk_size(&self) -> usize {
        BLOCK_HEADER_LEN + self.data.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        if self.data.len() > FFS_BLOCK_DATA_LEN {
            return Err(Error::InvalidArgument);
        }
        let header = BlockRecordHeader {
            magic: BLOCK_MAGIC,
            id: self.id.get(),
            seq: self.seq,
            rank: self.rank.get(),
            inode_id: self.inode_id.get(),
            reserved: 0,
            flags: self.flags.0,
            data_len: self.data.len() as u16,
            // Reserved for a later integrity check; always written as a
            // placeholder and ignored on read (§4.1).
            ecc: 0,
        };
        let mut out = Vec::with_capacity(self.on_disk_size());
        out.extend_from_slice(bytes_of(&header));
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < BLOCK_HEADER_LEN {
            return Err(Error::Corrupt);
        }
        let header: &BlockRecordHeader =
            bytemuck::try_from_bytes(&buf[..BLOCK_HEADER_LEN]).map_err(|_| Error::Corrupt)?;
        if header.magic != BLOCK_MAGIC {
            return Err(Error::Corrupt);
        }
        let data_len = header.data_len as usize;
        if data_len > FFS_BLOCK_DATA_LEN || buf.len() < BLOCK_HEADER_LEN + data_len {
            return Err(Error::Corrupt);
        }
        // `ecc` is reserved, not yet a real checksum; ignored on read (§4.1).
        Ok(Self {
            id: Id::new(header.id),
            seq: header.seq,
            rank: Rank::new(header.rank),
            inode_id: Id::new(header.inode_id),
            flags: BlockFlags(header.flags),
            data: buf[BLOCK_HEADER_LEN..BLOCK_HEADER_LEN + data_len].to_vec(),
        })
    }
}

/// Symbolic rendering of an area header, in the spirit of the teacher's
/// `impl Display for InodeFileMode` (`src/fs/ext4/inode.rs`), useful for
/// `fsck`-style diagnostics and test failure messages.
impl core::fmt::Display for AreaHeaderRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "area[{}]: magic={} len={} scratch={}",
            self.seq,
            if self.is_valid_magic() { "ok" } else { "bad" },
            { self.length },
            self.is_scratch != 0,
        )
    }
}

impl core::fmt::Display for InodeRecordHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "inode[{}]: seq={} parent={} dir={} name_len={}",
            { self.id },
            { self.seq },
            { self.parent_id },
            InodeFlags(self.flags).contains(InodeFlags::DIRECTORY),
            self.filename_len,
        )
    }
}

impl core::fmt::Display for BlockRecordHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "block[{}]: seq={} rank={} inode={} deleted={} data_len={}",
            { self.id },
            { self.seq },
            { self.rank },
            { self.inode_id },
            BlockFlags(self.flags).contains(BlockFlags::DELETED),
            { self.data_len },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_record_round_trips() {
        let rec = InodeRecord {
            id: Id::new(7),
            seq: 1,
            parent_id: Id::ROOT,
            flags: InodeFlags::EMPTY,
            filename: b"hello.txt".to_vec(),
        };
        let encoded = rec.encode().unwrap();
        let decoded = InodeRecord::decode(&encoded).unwrap();
        assert_eq!(rec, decoded);
    }

    /// §4.1: `ecc` is reserved for a later integrity check and must be
    /// ignored on read, so a garbage value there must not turn a
    /// well-formed record into `Corrupt`.
    #[test]
    fn inode_record_ignores_garbage_ecc_field() {
        let rec = InodeRecord {
            id: Id::new(7),
            seq: 1,
            parent_id: Id::ROOT,
            flags: InodeFlags::EMPTY,
            filename: b"hello.txt".to_vec(),
        };
        let mut encoded = rec.encode().unwrap();
        let ecc_offset = INODE_HEADER_LEN - core::mem::size_of::<u32>();
        encoded[ecc_offset..INODE_HEADER_LEN].copy_from_slice(&0xdead_beefu32.to_ne_bytes());
        assert_eq!(InodeRecord::decode(&encoded).unwrap(), rec);
    }

    #[test]
    fn block_record_round_trips() {
        let rec = BlockRecord {
            id: Id::new(9),
            seq: 0,
            rank: Rank::FIRST,
            inode_id: Id::new(7),
            flags: BlockFlags::EMPTY,
            data: vec![0xAAu8; 100],
        };
        let encoded = rec.encode().unwrap();
        let decoded = BlockRecord::decode(&encoded).unwrap();
        assert_eq!(rec, decoded);
    }

    #[test]
    fn block_record_ignores_garbage_ecc_field() {
        let rec = BlockRecord {
            id: Id::new(9),
            seq: 0,
            rank: Rank::FIRST,
            inode_id: Id::new(7),
            flags: BlockFlags::EMPTY,
            data: vec![0xAAu8; 100],
        };
        let mut encoded = rec.encode().unwrap();
        let ecc_offset = BLOCK_HEADER_LEN - core::mem::size_of::<u32>();
        encoded[ecc_offset..BLOCK_HEADER_LEN].copy_from_slice(&0xdead_beefu32.to_ne_bytes());
        assert_eq!(BlockRecord::decode(&encoded).unwrap(), rec);
    }

    #[test]
    fn header_display_impls_render() {
        let area = AreaHeaderRecord::new(4096, AreaSeq::new(3), true);
        assert!(format!("{area}").contains("magic=ok"));

        let inode = InodeRecordHeader {
            magic: INODE_MAGIC,
            id: 7,
            seq: 1,
            parent_id: 0,
            flags: InodeFlags::DIRECTORY.0,
            filename_len: 3,
            ecc: 0,
        };
        assert!(format!("{inode}").contains("dir=true"));

        let block = BlockRecordHeader {
            magic: BLOCK_MAGIC,
            id: 9,
            seq: 0,
            rank: 0,
            inode_id: 7,
            reserved: 0,
            flags: BlockFlags::DELETED.0,
            data_len: 100,
            ecc: 0,
        };
        assert!(format!("{block}").contains("deleted=true"));
    }

    #[test]
    fn area_header_round_trips() {
        let hdr = AreaHeaderRecord::new(4096, AreaSeq::new(3), true);
        let encoded = hdr.encode();
        let decoded = AreaHeaderRecord::decode(&encoded).unwrap();
        assert_eq!(hdr, decoded);
        assert_eq!(core::mem::size_of::<AreaHeaderRecord>(), AREA_HEADER_LEN);
    }
}
