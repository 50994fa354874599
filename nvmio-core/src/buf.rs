// vim: tw=80
//! Aligned, heap-allocated I/O buffers

use crate::types::*;
use std::{
    alloc::{self, Layout},
    fmt,
    ops::{Deref, DerefMut},
    ptr::NonNull,
    slice,
};

/// Default alignment of buffers handed out by the memory mixins.  One page
/// satisfies `O_DIRECT` on every supported platform.
pub const BUF_ALIGN: usize = 4096;

/// A zero-initialized byte buffer with a fixed alignment.
///
/// The data never moves while the `Buf` is alive, even if the `Buf` itself
/// does.  Asynchronous backends rely on that.
pub struct Buf {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// Buf owns its memory exclusively and has no interior mutability.
unsafe impl Send for Buf {}
unsafe impl Sync for Buf {}

impl Buf {
    /// Allocate `len` zeroed bytes aligned to `align`, which must be a power
    /// of two.
    pub fn alloc(len: usize, align: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::EINVAL);
        }
        let layout = Layout::from_size_align(len, align)
            .map_err(|_| Error::EINVAL)?;
        let p = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(p)
            .map(|ptr| Buf { ptr, len, layout })
            .ok_or(Error::ENOMEM)
    }

    /// Allocate a buffer and fill it with a copy of `data`.
    pub fn from_slice(data: &[u8], align: usize) -> Result<Self> {
        let mut buf = Buf::alloc(data.len(), align)?;
        buf.copy_from_slice(data);
        Ok(buf)
    }

    pub fn align(&self) -> usize {
        self.layout.align()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Resize the buffer, preserving its alignment and as much of its
    /// contents as fit.  Any new space is zeroed.
    pub fn realloc(self, len: usize) -> Result<Self> {
        let mut new = Buf::alloc(len, self.align())?;
        let n = len.min(self.len);
        new[..n].copy_from_slice(&self[..n]);
        Ok(new)
    }
}

impl AsMut<[u8]> for Buf {
    fn as_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buf")
            .field("len", &self.len)
            .field("align", &self.align())
            .finish()
    }
}

impl Deref for Buf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Buf {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// LCOV_EXCL_STOP
