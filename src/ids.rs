//! Typed identifiers and flag fields for on-disk and in-RAM objects.
//!
//! The newtype-plus-macro style here is lifted directly from the teacher's
//! `ext4_uint_field_derive_display!` / `ext4_flag_field!` macros
//! (originally `src/fs/ext4/sb.rs`, also used by `InodeNumber` in
//! `src/fs/ext4/inode.rs`): a `#[repr(transparent)]` `Pod + Zeroable`
//! wrapper around the plain integer that is actually stored on flash, with a
//! `Display` impl and the bitwise ops a flags field needs.

use bytemuck::{Pod, Zeroable};
use core::fmt;
use core::ops::{BitAnd, BitOr, BitXor};

/// Sentinel parent id for the root directory ("NONE" in the data model).
pub const NONE_ID: u32 = 0xffff_ffff;

/// Defines a `#[repr(transparent)]` integer newtype with a `Display` impl
/// that writes the bare integer, matching
/// `ext4_uint_field_derive_display!`.
macro_rules! ffs_uint_id {
    ($name:ident, $repr:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
        #[repr(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            /// Wraps a raw on-disk value.
            pub const fn new(raw: $repr) -> Self {
                Self(raw)
            }

            /// Returns the raw value as stored on flash.
            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_fmt(format_args!("{}", self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_fmt(format_args!("{}({})", stringify!($name), self.0))
            }
        }

        impl From<$repr> for $name {
            fn from(raw: $repr) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $repr {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

ffs_uint_id!(
    Id,
    u32,
    "A 32-bit object id. Inodes and blocks share this id space."
);

impl Id {
    /// The root directory's fixed id.
    pub const ROOT: Id = Id(0);

    /// Sentinel used as a parent id for the root, and as an absent-id marker.
    pub const NONE: Id = Id(NONE_ID);

    /// The bucket this id falls into in the 256-wide object index.
    pub fn bucket(self) -> usize {
        (self.0 % super::index::BUCKET_COUNT as u32) as usize
    }
}

ffs_uint_id!(AreaId, u16, "Logical id of an erase-unit area.");

ffs_uint_id!(
    Seq,
    u32,
    "Per-id supersede counter for inode and block records. Highest seq wins."
);

impl Seq {
    pub const ZERO: Seq = Seq(0);

    /// The seq a record written to supersede this one will carry.
    pub fn next(self) -> Seq {
        Seq(self.0 + 1)
    }
}

ffs_uint_id!(AreaSeq, u8, "Per-area generation counter, bumped on GC promotion.");

impl AreaSeq {
    pub fn next(self) -> AreaSeq {
        AreaSeq(self.0.wrapping_add(1))
    }
}

ffs_uint_id!(Rank, u32, "Intra-file ordering key for a file's blocks.");

impl Rank {
    pub const FIRST: Rank = Rank(0);

    pub fn next(self) -> Rank {
        Rank(self.0 + 1)
    }
}

/// Defines a `#[repr(transparent)]` bitflags newtype with the bitwise ops a
/// flags field needs, matching `ext4_flag_field!`.
macro_rules! ffs_flag_field {
    ($name:ident, $repr:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
        #[repr(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            pub const EMPTY: Self = Self(0);

            pub const fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn set(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn unset(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitXor for $name {
            type Output = Self;
            fn bitxor(self, rhs: Self) -> Self {
                Self(self.0 ^ rhs.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_fmt(format_args!("{}(0x{:x})", stringify!($name), self.0))
            }
        }
    };
}

ffs_flag_field!(InodeFlags, u16, "Flag bits stored in an inode record.");

impl InodeFlags {
    pub const DELETED: Self = Self(1 << 0);
    pub const DUMMY: Self = Self(1 << 1);
    pub const DIRECTORY: Self = Self(1 << 2);
    pub const TEST: Self = Self(1 << 3);
}

ffs_flag_field!(BlockFlags, u16, "Flag bits stored in a block record.");

impl BlockFlags {
    pub const DELETED: Self = Self(1 << 0);
}
