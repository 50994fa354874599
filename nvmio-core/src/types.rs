// vim: tw=80
//! Common type definitions used throughout nvmio

use enum_primitive_derive::Primitive;
use num_traits::{FromPrimitive, ToPrimitive};
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use std::io;

/// Indexes a logical block on a device.  Its size depends on the device's
/// active LBA format.
pub type LbaT = u64;

/// NVMe namespace identifier
pub type NsidT = u32;

/// The broadcast namespace identifier.
pub const NSID_ALL: NsidT = 0xFFFF_FFFF;

/// nvmio's error type.  Basically just an errno
///
/// Only the codes that storage paths produce have their own variant.  Any
/// other OS error becomes `EUNKNOWN`.
///
/// Only transport and usage failures become an `Error`.  A command that the
/// device executed and failed reports that through its completion status
/// instead.
#[derive(Clone, Copy, Debug, Deserialize, Error, Eq, PartialEq, Primitive,
         Serialize)]
pub enum Error {
    #[error("Operation not permitted")]
    EPERM           = libc::EPERM as isize,
    #[error("No such file or directory")]
    ENOENT          = libc::ENOENT as isize,
    #[error("Interrupted system call")]
    EINTR           = libc::EINTR as isize,
    #[error("Input/output error")]
    EIO             = libc::EIO as isize,
    #[error("Device not configured")]
    ENXIO           = libc::ENXIO as isize,
    #[error("Argument list too long")]
    E2BIG           = libc::E2BIG as isize,
    #[error("Bad file descriptor")]
    EBADF           = libc::EBADF as isize,
    #[error("Cannot allocate memory")]
    ENOMEM          = libc::ENOMEM as isize,
    #[error("Permission denied")]
    EACCES          = libc::EACCES as isize,
    #[error("Bad address")]
    EFAULT          = libc::EFAULT as isize,
    #[error("Block device required")]
    ENOTBLK         = libc::ENOTBLK as isize,
    #[error("Device busy")]
    EBUSY           = libc::EBUSY as isize,
    #[error("File exists")]
    EEXIST          = libc::EEXIST as isize,
    #[error("Operation not supported by device")]
    ENODEV          = libc::ENODEV as isize,
    #[error("Not a directory")]
    ENOTDIR         = libc::ENOTDIR as isize,
    #[error("Is a directory")]
    EISDIR          = libc::EISDIR as isize,
    #[error("Invalid argument")]
    EINVAL          = libc::EINVAL as isize,
    #[error("Too many open files")]
    EMFILE          = libc::EMFILE as isize,
    #[error("Inappropriate ioctl for device")]
    ENOTTY          = libc::ENOTTY as isize,
    #[error("File too large")]
    EFBIG           = libc::EFBIG as isize,
    #[error("No space left on device")]
    ENOSPC          = libc::ENOSPC as isize,
    #[error("Illegal seek")]
    ESPIPE          = libc::ESPIPE as isize,
    #[error("Read-only file system")]
    EROFS           = libc::EROFS as isize,
    #[error("Result too large")]
    ERANGE          = libc::ERANGE as isize,
    #[error("Resource temporarily unavailable")]
    EAGAIN          = libc::EAGAIN as isize,
    #[error("Operation not supported")]
    EOPNOTSUPP      = libc::EOPNOTSUPP as isize,
    #[error("Operation timed out")]
    ETIMEDOUT       = libc::ETIMEDOUT as isize,
    #[error("File name too long")]
    ENAMETOOLONG    = libc::ENAMETOOLONG as isize,
    #[error("Function not implemented")]
    ENOSYS          = libc::ENOSYS as isize,
    #[error("Value too large to be stored in data type")]
    EOVERFLOW       = libc::EOVERFLOW as isize,
    #[error("Operation canceled")]
    ECANCELED       = libc::ECANCELED as isize,
    #[error("Protocol error")]
    EPROTO          = libc::EPROTO as isize,

    // Not an errno
    #[error("Unknown error")]
    EUNKNOWN        = 256,
}

impl Error {
    /// The negative errno that C-style callers expect, e.g. `-EINVAL`.
    pub fn neg(self) -> i32 {
        -i32::from(self)
    }

    /// Inverse of [`Error::neg`].  Accepts either sign.
    pub fn from_neg(code: i32) -> Self {
        Error::from_i32(code.abs()).unwrap_or(Error::EUNKNOWN)
    }

    /// Read the calling thread's `errno`.
    pub fn last() -> Self {
        Error::from(nix::Error::last())
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        e.raw_os_error()
            .and_then(Error::from_i32)
            .unwrap_or(Error::EUNKNOWN)
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        Error::from_i32(e as i32).unwrap_or(Error::EUNKNOWN)
    }
}

impl From<Error> for i32 {
    fn from(e: Error) -> Self {
        match e {
            // Not an errno; report it as a generic I/O failure
            Error::EUNKNOWN => libc::EIO,
            _ => e.to_i32().unwrap_or(libc::EIO)
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

// LCOV_EXCL_STOP
