#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod block;
pub mod codec;
pub mod errors;
pub mod flash;
pub mod fs;
pub mod handle;
pub mod ids;
pub mod index;
pub mod inode;
pub mod path;
pub mod pool;
pub mod reserve;
pub mod restore;

#[cfg(test)]
pub mod testutil;

pub use crate::errors::Error;
pub use crate::flash::{AreaDescriptor, FlashDevice};
pub use crate::fs::{FileHandle, Filesystem};
pub use crate::handle::OpenFlags;
