// vim: tw=80
//! Command contexts: one command, its completion, and where it's headed

use crate::{
    buf::Buf,
    dev::Device,
    spec::{Cmd, Cpl, Status},
    types::*,
};
use std::{fmt, io::IoSliceMut};

/// Completion callback of an asynchronous command.
///
/// Invoked from within [`Queue::poke`](crate::queue::Queue::poke) with the
/// completed context and the buffers that were submitted with it.
pub type Callback<'d> = Box<dyn FnMut(&mut CmdCtx<'d>, Payload) + 'd>;

/// Buffers that travel with an asynchronous command.
#[derive(Debug)]
pub enum Payload {
    Contig {
        data: Option<Buf>,
        meta: Option<Buf>,
    },
    Vectored {
        data: Vec<Buf>,
        meta: Vec<Buf>,
    },
}

impl Payload {
    pub fn none() -> Self {
        Payload::Contig { data: None, meta: None }
    }

    /// Total number of data bytes
    pub fn data_len(&self) -> usize {
        match self {
            Payload::Contig { data, .. } => data.as_ref().map_or(0, Buf::len),
            Payload::Vectored { data, .. } => data.iter().map(Buf::len).sum(),
        }
    }

    /// The data buffer of a contiguous payload
    pub fn data(&self) -> Option<&Buf> {
        match self {
            Payload::Contig { data, .. } => data.as_ref(),
            Payload::Vectored { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<Buf> {
        match self {
            Payload::Contig { data, .. } => data,
            Payload::Vectored { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Mode {
    Sync,
    /// Owned by queue `qid`, at this index of its pool
    Async { qid: u32, tag: u16 },
}

/// The unit of work.
///
/// Synchronous contexts are created on demand with [`CmdCtx::from_dev`].
/// Asynchronous contexts belong to a [`Queue`](crate::queue::Queue), which
/// hands them out and takes them back.
pub struct CmdCtx<'d> {
    pub cmd: Cmd,
    pub cpl: Cpl,
    dev: &'d Device,
    mode: Mode,
    pub(crate) cb: Option<Callback<'d>>,
}

impl<'d> CmdCtx<'d> {
    /// A context for synchronous execution on `dev`
    pub fn from_dev(dev: &'d Device) -> Self {
        CmdCtx {
            cmd: Cmd::default(),
            cpl: Cpl::default(),
            dev,
            mode: Mode::Sync,
            cb: None,
        }
    }

    pub(crate) fn for_queue(dev: &'d Device, qid: u32, tag: u16) -> Self {
        CmdCtx {
            mode: Mode::Async { qid, tag },
            ..CmdCtx::from_dev(dev)
        }
    }

    pub fn dev(&self) -> &'d Device {
        self.dev
    }

    pub fn is_async(&self) -> bool {
        matches!(self.mode, Mode::Async { .. })
    }

    /// The owning queue's id and this context's index in its pool
    pub(crate) fn slot(&self) -> Option<(u32, u16)> {
        match self.mode {
            Mode::Async { qid, tag } => Some((qid, tag)),
            Mode::Sync => None,
        }
    }

    /// Status of the last completion.  The caller must check this after
    /// every successful `pass`.
    pub fn cpl_status(&self) -> Status {
        self.cpl.status
    }

    /// Install a completion callback for this context only.  It takes
    /// precedence over the queue's default callback and stays installed
    /// while the context is reused.
    pub fn set_cb<F>(&mut self, cb: F)
        where F: FnMut(&mut CmdCtx<'d>, Payload) + 'd
    {
        self.cb = Some(Box::new(cb));
    }

    pub fn clear_cb(&mut self) {
        self.cb = None;
    }

    /// Clear the command and completion before reuse.
    pub(crate) fn reset(&mut self) {
        self.cmd = Cmd::default();
        self.cpl = Cpl::default();
    }

    fn sync_only(&mut self) -> Result<()> {
        if self.is_async() {
            return Err(Error::EINVAL);
        }
        self.cpl = Cpl::default();
        Ok(())
    }

    /// Execute `self.cmd` as an I/O command and wait for it.
    ///
    /// `Ok` only means that the command reached the device.  Whether it
    /// succeeded there is recorded in `self.cpl`.
    pub fn pass(&mut self, data: Option<&mut [u8]>, meta: Option<&mut [u8]>)
        -> Result<()>
    {
        self.sync_only()?;
        let dev = self.dev;
        dev.bound().sync.cmd_io(self, data, meta)
    }

    /// Like [`pass`](Self::pass), with scatter/gather buffers.
    pub fn passv(&mut self, data: &mut [IoSliceMut<'_>],
                 meta: &mut [IoSliceMut<'_>]) -> Result<()>
    {
        self.sync_only()?;
        let dev = self.dev;
        dev.bound().sync.cmd_iov(self, data, meta)
    }

    /// Execute `self.cmd` as an administrative command and wait for it.
    pub fn pass_admin(&mut self, data: Option<&mut [u8]>,
                      meta: Option<&mut [u8]>) -> Result<()>
    {
        self.sync_only()?;
        let dev = self.dev;
        dev.bound().admin.cmd_admin(self, data, meta)
    }

    /// Like [`pass_admin`](Self::pass_admin), with scatter/gather buffers.
    ///
    /// Administrative commands transfer at most one data buffer, so only a
    /// single-element list is accepted.
    pub fn passv_admin(&mut self, data: &mut [IoSliceMut<'_>],
                       meta: &mut [IoSliceMut<'_>]) -> Result<()>
    {
        if data.len() > 1 || meta.len() > 1 {
            return Err(Error::EINVAL);
        }
        let data = data.first_mut().map(|s| &mut s[..]);
        let meta = meta.first_mut().map(|s| &mut s[..]);
        self.pass_admin(data, meta)
    }
}

impl fmt::Debug for CmdCtx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmdCtx")
            .field("cmd", &self.cmd)
            .field("cpl", &self.cpl)
            .field("mode", &self.mode)
            .field("cb", &self.cb.is_some())
            .finish()
    }
}
