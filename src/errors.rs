//! Error types shared across the filesystem core.
//!
//! Mirrors the teacher's `BaseError` / `CanFail<T>` convention
//! (originally `src/fzboot/err.rs`): a single flat enum carrying every error
//! kind an entry point can surface, and a `CanFail` alias for operations
//! that either succeed with no value or fail.

use core::fmt;

/// Every error kind an entry point of the filesystem can return.
///
/// `OK` from the specification is represented as `Result::Ok(())`, not as a
/// variant of this enum, per Rust convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// A fixed-size pool (file handle, inode, or block) is exhausted.
    NoMem,

    /// A path component, or the object it names, does not exist.
    NotFound,

    /// The target of a create or rename already exists and cannot be
    /// superseded implicitly.
    Exists,

    /// An argument violates a documented precondition (e.g. a filename
    /// longer than the short-name bound).
    InvalidArgument,

    /// The caller is not allowed to perform the requested operation.
    AccessDenied,

    /// `unlink`/`rmdir` was called on a non-empty directory.
    NotEmpty,

    /// A record failed to decode: bad magic, truncated trailer, or a
    /// checksum mismatch on a targeted (non-restore) read.
    Corrupt,

    /// No area has enough contiguous free space for the request, even
    /// after garbage collection.
    Full,

    /// The underlying flash driver reported a failure.
    Io,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NoMem => "out of memory",
            Error::NotFound => "no such file or directory",
            Error::Exists => "file exists",
            Error::InvalidArgument => "invalid argument",
            Error::AccessDenied => "permission denied",
            Error::NotEmpty => "directory not empty",
            Error::Corrupt => "corrupt record",
            Error::Full => "no space left on device",
            Error::Io => "I/O error",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

/// Return type for operations that either succeed with nothing to report or
/// fail with an [`Error`] — a direct port of the teacher's `CanFail<T>`.
pub type CanFail = Result<(), Error>;
