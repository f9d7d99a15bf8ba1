//! Flash access layer: bounds-checked wrapper over the external flash
//! driver, area lookup by logical id, and a copy helper used by GC.
//!
//! Grounded in the teacher's `DiskDevice` trait
//! (`src/drivers/generics/dev_disk.rs`), which exposes `read`/`write` over a
//! disk addressed by sector plus a table of `Partition`s — here the unit of
//! addressing is a whole area (erase unit) instead of a sector range, and
//! the table is the area descriptor table from §6 instead of an MBR/GPT
//! partition table (`src/fs/partitions/mod.rs`).

use alloc::vec;
use alloc::vec::Vec;

use crate::errors::{CanFail, Error};
use crate::ids::AreaId;

/// Maximum number of areas a single filesystem instance may be configured
/// with.
pub const MAX_AREAS: usize = 32;

/// One entry of the area descriptor table supplied by the caller at
/// format/restore time. Areas are never resized; this table is the crate's
/// entire configuration surface (see `SPEC_FULL.md` section A.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AreaDescriptor {
    pub offset: u32,
    pub length: u32,
}

impl AreaDescriptor {
    pub const fn new(offset: u32, length: u32) -> Self {
        Self { offset, length }
    }
}

/// The external capability this crate consumes; out of scope to implement,
/// per the purpose-and-scope boundary that treats the flash driver as an
/// external collaborator.
pub trait FlashDevice {
    /// Reads `buf.len()` bytes from `area` starting at `offset`.
    fn read(&mut self, area: AreaId, offset: u32, buf: &mut [u8]) -> CanFail;

    /// Writes `buf` to `area` starting at `offset`. The driver is assumed to
    /// make a single write idempotent at the word level.
    fn write(&mut self, area: AreaId, offset: u32, buf: &[u8]) -> CanFail;

    /// Erases `area` in full.
    fn erase(&mut self, area: AreaId) -> CanFail;
}

/// Thin wrapper over a [`FlashDevice`] adding bounds checks against the area
/// descriptor table and an area-lookup-by-id helper.
pub struct Flash<D: FlashDevice> {
    device: D,
    descs: Vec<AreaDescriptor>,
}

impl<D: FlashDevice> Flash<D> {
    pub fn new(device: D, descs: &[AreaDescriptor]) -> Self {
        Self {
            device,
            descs: descs.to_vec(),
        }
    }

    pub fn area_count(&self) -> usize {
        self.descs.len()
    }

    /// Unwraps the underlying device, e.g. to simulate an unmount/remount
    /// cycle in tests without losing the backing storage.
    pub fn into_device(self) -> D {
        self.device
    }

    pub fn descriptor(&self, area: AreaId) -> Result<AreaDescriptor, Error> {
        self.descs
            .get(area.get() as usize)
            .copied()
            .ok_or(Error::InvalidArgument)
    }

    pub fn descriptors(&self) -> &[AreaDescriptor] {
        &self.descs
    }

    /// Bounds-checked read: fails with `InvalidArgument` if `offset + buf.len()`
    /// would run past the area's declared length.
    pub fn read(&mut self, area: AreaId, offset: u32, buf: &mut [u8]) -> CanFail {
        let desc = self.descriptor(area)?;
        self.check_bounds(&desc, offset, buf.len())?;
        self.device.read(area, offset, buf)
    }

    pub fn write(&mut self, area: AreaId, offset: u32, buf: &[u8]) -> CanFail {
        let desc = self.descriptor(area)?;
        self.check_bounds(&desc, offset, buf.len())?;
        self.device.write(area, offset, buf)
    }

    pub fn erase(&mut self, area: AreaId) -> CanFail {
        self.descriptor(area)?;
        self.device.erase(area)
    }

    /// Copies `len` bytes from `(src_area, src_off)` to `(dst_area, dst_off)`
    /// through an intermediate buffer, used by the GC streaming step.
    pub fn copy(
        &mut self,
        src_area: AreaId,
        src_off: u32,
        dst_area: AreaId,
        dst_off: u32,
        len: usize,
    ) -> CanFail {
        let mut buf = vec![0u8; len];
        self.read(src_area, src_off, &mut buf)?;
        self.write(dst_area, dst_off, &buf)
    }

    fn check_bounds(&self, desc: &AreaDescriptor, offset: u32, len: usize) -> CanFail {
        let end = offset
            .checked_add(len as u32)
            .ok_or(Error::InvalidArgument)?;
        if end > desc.length {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}
