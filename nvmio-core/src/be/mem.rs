// vim: tw=80
//! Memory mixins

use super::MemMixin;
use crate::{
    buf::{Buf, BUF_ALIGN},
    dev::Device,
    types::*,
};

/// Page-aligned buffers from the global allocator
pub struct Posix;

impl MemMixin for Posix {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn buf_alloc(&self, _dev: &Device, nbytes: usize) -> Result<Buf> {
        Buf::alloc(nbytes, BUF_ALIGN)
    }
}

// LCOV_EXCL_STOP
