// vim: tw=80
//! Asynchronous command queues
//!
//! A queue owns a fixed pool of command contexts.  The life cycle of each is
//! `Free -> CheckedOut -> Submitted -> Completed -> Free`:
//!
//! * [`Queue::get_cmd_ctx`] checks a context out of the pool.
//! * [`Queue::pass`] submits it.  If submission fails, the context comes
//!   back to the caller, still checked out.
//! * [`Queue::poke`] reaps completions, invoking the context's callback (or
//!   else the queue's) and then returning the context to the pool.
//!
//! A queue is not thread-safe; it's meant to be driven by a single thread.

use crate::{
    be::{AsyncEngine, Completion, Request},
    buf::Buf,
    cmd::{Callback, CmdCtx, Payload},
    dev::Device,
    types::*,
};
use std::{
    fmt,
    mem,
    sync::atomic::{AtomicU32, Ordering},
    thread,
};
use tracing::{error, warn};

/// Largest number of commands a queue may hold
pub const QUEUE_MAX_CAPACITY: u32 = 4096;

/// Source of queue ids.  A context remembers the id of the queue that made
/// it, so no other queue will accept it.
static NEXT_QID: AtomicU32 = AtomicU32::new(0);

/// A submission that didn't happen.  The context is still checked out, and
/// the buffers are handed back unused.
pub struct Rejected<'d> {
    pub error: Error,
    pub ctx: CmdCtx<'d>,
    pub payload: Payload,
}

impl fmt::Debug for Rejected<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl From<Rejected<'_>> for Error {
    fn from(r: Rejected<'_>) -> Self {
        r.error
    }
}

pub struct Queue<'d> {
    dev: &'d Device,
    id: u32,
    capacity: u32,
    outstanding: u32,
    /// Contexts that are neither checked out nor submitted
    free: Vec<CmdCtx<'d>>,
    /// Submitted contexts, indexed by tag
    inflight: Vec<Option<CmdCtx<'d>>>,
    /// Which tags are checked out to the caller
    checked_out: Vec<bool>,
    engine: Box<dyn AsyncEngine>,
    /// Default completion callback
    cb: Option<Callback<'d>>,
    /// Scratch space for completions
    done: Vec<Completion>,
    terminated: bool,
}

impl<'d> Queue<'d> {
    /// Create a queue of `capacity` commands on `dev`, using the device's
    /// asynchronous mixin.  `capacity` must be a power of two no larger than
    /// [`QUEUE_MAX_CAPACITY`].
    #[tracing::instrument(skip(dev))]
    pub fn init(dev: &'d Device, capacity: u32, flags: u32) -> Result<Self> {
        if !capacity.is_power_of_two() || capacity > QUEUE_MAX_CAPACITY {
            error!("invalid queue capacity");
            return Err(Error::EINVAL);
        }
        let engine = dev.bound().async_.init(dev, capacity, flags)?;
        let id = NEXT_QID.fetch_add(1, Ordering::Relaxed);
        let free = (0..capacity)
            .rev()
            .map(|tag| CmdCtx::for_queue(dev, id, tag as u16))
            .collect();
        let inflight = (0..capacity).map(|_| None).collect();
        Ok(Queue {
            dev,
            id,
            capacity,
            outstanding: 0,
            free,
            inflight,
            checked_out: vec![false; capacity as usize],
            engine,
            cb: None,
            done: Vec::with_capacity(capacity as usize),
            terminated: false,
        })
    }

    pub fn dev(&self) -> &'d Device {
        self.dev
    }

    pub fn get_capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of submitted commands whose completions have not been reaped
    pub fn get_outstanding(&self) -> u32 {
        self.outstanding
    }

    /// Number of contexts available to [`get_cmd_ctx`](Self::get_cmd_ctx)
    pub fn free_count(&self) -> u32 {
        self.free.len() as u32
    }

    /// Set the callback for contexts that don't have their own.
    pub fn set_cb<F>(&mut self, cb: F)
        where F: FnMut(&mut CmdCtx<'d>, Payload) + 'd
    {
        self.cb = Some(Box::new(cb));
    }

    /// Check a context out of the pool.  Fails with `ENOMEM` if every
    /// context is checked out or in flight.
    pub fn get_cmd_ctx(&mut self) -> Result<CmdCtx<'d>> {
        let ctx = self.free.pop().ok_or(Error::ENOMEM)?;
        if let Some((_, tag)) = ctx.slot() {
            self.checked_out[usize::from(tag)] = true;
        }
        Ok(ctx)
    }

    /// Return an unsubmitted context to the pool.
    pub fn put_cmd_ctx(&mut self, mut ctx: CmdCtx<'d>) -> Result<()> {
        let Some(tag) = self.owned_tag(&ctx) else {
            return Err(Error::EINVAL);
        };
        self.checked_out[usize::from(tag)] = false;
        ctx.reset();
        self.free.push(ctx);
        Ok(())
    }

    /// If `ctx` is checked out of this queue and not yet submitted, its tag
    fn owned_tag(&self, ctx: &CmdCtx<'d>) -> Option<u16> {
        let (qid, tag) = ctx.slot()?;
        let checked_out = self.checked_out.get(usize::from(tag))
            .copied()
            .unwrap_or(false);
        (qid == self.id && checked_out).then_some(tag)
    }

    fn submit(&mut self, mut ctx: CmdCtx<'d>, payload: Payload)
        -> std::result::Result<(), Rejected<'d>>
    {
        let Some(tag) = self.owned_tag(&ctx) else {
            return Err(Rejected { error: Error::EINVAL, ctx, payload });
        };
        if self.outstanding >= self.capacity {
            return Err(Rejected { error: Error::EBUSY, ctx, payload });
        }
        ctx.cmd.cid = tag;
        ctx.cpl = Default::default();
        let req = Request { tag, cmd: ctx.cmd, payload };
        match self.engine.cmd_io(self.dev, req) {
            Ok(()) => {
                self.checked_out[usize::from(tag)] = false;
                self.inflight[usize::from(tag)] = Some(ctx);
                self.outstanding += 1;
                Ok(())
            }
            Err((error, req)) => {
                Err(Rejected { error, ctx, payload: req.payload })
            }
        }
    }

    /// Submit `ctx.cmd`, with contiguous data and metadata buffers.
    ///
    /// The buffers are handed to the completion callback.  On failure,
    /// including the transient `EBUSY`, nothing was submitted and
    /// everything comes back in the [`Rejected`].
    pub fn pass(&mut self, ctx: CmdCtx<'d>, data: Option<Buf>,
                meta: Option<Buf>) -> std::result::Result<(), Rejected<'d>>
    {
        self.submit(ctx, Payload::Contig { data, meta })
    }

    /// Like [`pass`](Self::pass), with scatter/gather buffers.
    pub fn passv(&mut self, ctx: CmdCtx<'d>, data: Vec<Buf>, meta: Vec<Buf>)
        -> std::result::Result<(), Rejected<'d>>
    {
        self.submit(ctx, Payload::Vectored { data, meta })
    }

    fn complete(&mut self, c: Completion) {
        let slot = self.inflight.get_mut(usize::from(c.tag))
            .and_then(Option::take);
        let Some(mut ctx) = slot else {
            error!(tag = c.tag, "completion for a command not in flight");
            return;
        };
        self.outstanding -= 1;
        ctx.cpl = c.cpl;
        if let Some(mut cb) = ctx.cb.take() {
            cb(&mut ctx, c.payload);
            // The callback may have installed a replacement
            if ctx.cb.is_none() {
                ctx.cb = Some(cb);
            }
        } else if let Some(cb) = self.cb.as_mut() {
            cb(&mut ctx, c.payload);
        } else {
            warn!(tag = c.tag, "no callback for completed command");
        }
        ctx.reset();
        self.free.push(ctx);
    }

    /// Reap at most `max` completed commands, or every completed command if
    /// `max` is 0, invoking their callbacks.  Never blocks.  Returns the
    /// number reaped.
    pub fn poke(&mut self, max: u32) -> Result<u32> {
        if self.outstanding == 0 {
            return Ok(0);
        }
        let mut done = mem::take(&mut self.done);
        let r = self.engine.poke(self.dev, max, &mut done);
        for c in done.drain(..) {
            self.complete(c);
        }
        self.done = done;
        r
    }

    /// Reap completions until no command is outstanding.  Returns the
    /// number reaped.
    pub fn drain(&mut self) -> Result<u32> {
        let mut reaped = 0;
        while self.outstanding > 0 {
            reaped += self.poke(0)?;
        }
        Ok(reaped)
    }

    /// Tear down the queue.
    ///
    /// # Panics
    ///
    /// If any command is still outstanding.  In-flight commands own device
    /// memory that can't be reclaimed safely.
    pub fn term(mut self) -> Result<()> {
        assert_eq!(self.outstanding, 0,
                   "Queue terminated with commands outstanding");
        self.terminated = true;
        self.engine.term(self.dev)
    }
}

impl Drop for Queue<'_> {
    fn drop(&mut self) {
        if self.outstanding > 0 && !thread::panicking() {
            panic!("Queue dropped with {} commands outstanding",
                   self.outstanding);
        }
        if !self.terminated {
            if let Err(e) = self.engine.term(self.dev) {
                warn!(error = ?e, "failed to terminate async engine");
            }
        }
    }
}

impl fmt::Debug for Queue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("outstanding", &self.outstanding)
            .field("free", &self.free.len())
            .finish()
    }
}

// LCOV_EXCL_STOP
