//! In-memory [`FlashDevice`] for tests, grounded in `rcore-fs-lfs`'s
//! `MemStorage`: a plain `Vec<u8>` per area, erase fills with `0xff` to
//! mimic real NOR flash's erased state.

use alloc::vec;
use alloc::vec::Vec;

use crate::errors::{CanFail, Error};
use crate::flash::{AreaDescriptor, FlashDevice};
use crate::ids::AreaId;

pub struct RamFlash {
    areas: Vec<Vec<u8>>,
}

impl RamFlash {
    pub fn new(descs: &[AreaDescriptor]) -> Self {
        Self {
            areas: descs.iter().map(|d| vec![0xffu8; d.length as usize]).collect(),
        }
    }
}

impl FlashDevice for RamFlash {
    fn read(&mut self, area: AreaId, offset: u32, buf: &mut [u8]) -> CanFail {
        let mem = self.areas.get(area.get() as usize).ok_or(Error::InvalidArgument)?;
        let start = offset as usize;
        let end = start + buf.len();
        if end > mem.len() {
            return Err(Error::InvalidArgument);
        }
        buf.copy_from_slice(&mem[start..end]);
        Ok(())
    }

    fn write(&mut self, area: AreaId, offset: u32, buf: &[u8]) -> CanFail {
        let mem = self.areas.get_mut(area.get() as usize).ok_or(Error::InvalidArgument)?;
        let start = offset as usize;
        let end = start + buf.len();
        if end > mem.len() {
            return Err(Error::InvalidArgument);
        }
        mem[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn erase(&mut self, area: AreaId) -> CanFail {
        let mem = self.areas.get_mut(area.get() as usize).ok_or(Error::InvalidArgument)?;
        mem.iter_mut().for_each(|b| *b = 0xff);
        Ok(())
    }
}
