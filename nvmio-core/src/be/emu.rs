// vim: tw=80
//! Asynchronous engines that need no operating system support
//!
//! `emu` runs queued commands through the device's synchronous mixin when the
//! queue is poked.  `nil` completes commands without doing anything at all,
//! which is handy for measuring the overhead of the queue itself.

use super::{AsyncEngine, AsyncMixin, Completion, Request};
use crate::{
    cmd::{CmdCtx, Payload},
    dev::Device,
    spec::{Cpl, SCT_VENDOR},
    types::*,
};
use std::{collections::VecDeque, io::IoSliceMut};
use tracing::debug;

/// Run `req` synchronously, returning its completion.
fn execute(dev: &Device, mut req: Request) -> Completion {
    let mut ctx = CmdCtx::from_dev(dev);
    ctx.cmd = req.cmd;
    let sync = &dev.bound().sync;
    let r = match &mut req.payload {
        Payload::Contig { data, meta } => {
            sync.cmd_io(&mut ctx, data.as_deref_mut(), meta.as_deref_mut())
        }
        Payload::Vectored { data, meta } => {
            let mut dvec = data.iter_mut()
                .map(|b| IoSliceMut::new(&mut b[..]))
                .collect::<Vec<_>>();
            let mut mvec = meta.iter_mut()
                .map(|b| IoSliceMut::new(&mut b[..]))
                .collect::<Vec<_>>();
            sync.cmd_iov(&mut ctx, &mut dvec, &mut mvec)
        }
    };
    if let Err(e) = r {
        debug!(opcode = req.cmd.opcode, error = ?e, "emulated command failed");
        // The command never executed, so the status is still clean.  Make
        // sure the failure is visible anyway.
        if !ctx.cpl.is_err() {
            ctx.cpl.status.set_sct(SCT_VENDOR);
            ctx.cpl.status.set_sc(i32::from(e) as u16 & 0xFF);
        }
    }
    Completion {
        tag: req.tag,
        cpl: ctx.cpl,
        payload: req.payload,
    }
}

/// Emulate asynchronous I/O by deferring synchronous I/O until poked
pub struct Emu;

impl AsyncMixin for Emu {
    fn name(&self) -> &'static str {
        "emu"
    }

    fn init(&self, _dev: &Device, depth: u32, _flags: u32)
        -> Result<Box<dyn AsyncEngine>>
    {
        Ok(Box::new(EmuEngine {
            depth: depth as usize,
            sq: VecDeque::with_capacity(depth as usize),
        }))
    }
}

struct EmuEngine {
    depth: usize,
    sq: VecDeque<Request>,
}

impl AsyncEngine for EmuEngine {
    fn cmd_io(&mut self, _dev: &Device, req: Request)
        -> std::result::Result<(), (Error, Request)>
    {
        if self.sq.len() >= self.depth {
            return Err((Error::EBUSY, req));
        }
        self.sq.push_back(req);
        Ok(())
    }

    fn poke(&mut self, dev: &Device, max: u32, done: &mut Vec<Completion>)
        -> Result<u32>
    {
        let pending = self.sq.len();
        let n = match max as usize {
            0 => pending,
            max => max.min(pending),
        };
        done.extend(self.sq.drain(..n).map(|req| execute(dev, req)));
        Ok(n as u32)
    }

    fn term(&mut self, _dev: &Device) -> Result<()> {
        if !self.sq.is_empty() {
            debug!(pending = self.sq.len(), "discarding unexecuted commands");
            self.sq.clear();
        }
        Ok(())
    }
}

/// Complete every command immediately, without executing it
pub struct Nil;

impl AsyncMixin for Nil {
    fn name(&self) -> &'static str {
        "nil"
    }

    fn init(&self, _dev: &Device, depth: u32, _flags: u32)
        -> Result<Box<dyn AsyncEngine>>
    {
        Ok(Box::new(NilEngine {
            depth: depth as usize,
            done: Vec::with_capacity(depth as usize),
        }))
    }
}

struct NilEngine {
    depth: usize,
    done: Vec<Request>,
}

impl AsyncEngine for NilEngine {
    fn cmd_io(&mut self, _dev: &Device, req: Request)
        -> std::result::Result<(), (Error, Request)>
    {
        if self.done.len() >= self.depth {
            return Err((Error::EBUSY, req));
        }
        self.done.push(req);
        Ok(())
    }

    fn poke(&mut self, _dev: &Device, max: u32, done: &mut Vec<Completion>)
        -> Result<u32>
    {
        let pending = self.done.len();
        let n = match max as usize {
            0 => pending,
            max => max.min(pending),
        };
        done.extend(self.done.drain(..n).map(|req| Completion {
            tag: req.tag,
            cpl: Cpl::default(),
            payload: req.payload,
        }));
        Ok(n as u32)
    }
}

// LCOV_EXCL_STOP
