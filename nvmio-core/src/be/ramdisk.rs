// vim: tw=80
//! A device backed by heap memory
//!
//! The target names the size: `ram:4GB` or `ram:64MB`.

use super::{
    check_fs_xfer,
    check_nvm_xfer,
    emu,
    idfy_emulated,
    mem,
    AdminMixin,
    Backend,
    DevMixin,
    DevState,
    Mixin,
    SyncMixin,
};
use crate::{
    cmd::CmdCtx,
    ident::{DevType, Ident},
    opts::Opts,
    spec::*,
    types::*,
};
use std::{
    io::IoSliceMut,
    sync::{Arc, Mutex},
};
use tracing::debug;

/// The memory behind one ramdisk device
pub struct RamdiskState {
    mem: Mutex<Vec<u8>>,
    size: usize,
}

impl DevState for RamdiskState {}

impl RamdiskState {
    fn new(size: usize) -> Result<Self> {
        let mut v = Vec::new();
        v.try_reserve_exact(size).map_err(|_| Error::ENOMEM)?;
        v.resize(size, 0);
        Ok(RamdiskState { mem: Mutex::new(v), size })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Parse a size of the form `<N>GB` or `<N>MB`.
fn parse_size(target: &str) -> Result<usize> {
    let (digits, unit) = if let Some(n) = target.strip_suffix("GB") {
        (n, 1usize << 30)
    } else if let Some(n) = target.strip_suffix("MB") {
        (n, 1usize << 20)
    } else {
        return Err(Error::EINVAL);
    };
    let n = digits.parse::<usize>().map_err(|_| Error::EINVAL)?;
    match n.checked_mul(unit) {
        Some(0) | None => Err(Error::EINVAL),
        Some(size) => Ok(size),
    }
}

struct RamDev;

impl DevMixin for RamDev {
    fn name(&self) -> &'static str {
        "ramdisk"
    }

    fn dev_open(&self, ident: &mut Ident, _opts: &Opts)
        -> Result<Box<dyn DevState>>
    {
        let size = parse_size(ident.target()).map_err(|e| {
            debug!(%ident, "not a ramdisk size");
            e
        })?;
        let state = RamdiskState::new(size)?;
        ident.dtype = DevType::Ramdisk;
        ident.csi = Csi::Nvm;
        ident.nsid = 1;
        Ok(Box::new(state))
    }
}

struct RamAdmin;

impl AdminMixin for RamAdmin {
    fn name(&self) -> &'static str {
        "ramdisk"
    }

    fn cmd_admin(&self, ctx: &mut CmdCtx<'_>, data: Option<&mut [u8]>,
                 _meta: Option<&mut [u8]>) -> Result<()>
    {
        match ctx.cmd.opcode {
            ADM_OPC_IDFY => {
                let buf = data.filter(|b| b.len() >= IDFY_NBYTES)
                    .ok_or(Error::EINVAL)?;
                let size = ctx.dev().state::<RamdiskState>()?.size() as u64;
                idfy_emulated(ctx, size, "nvmio ramdisk", buf)
            }
            ADM_OPC_GFEAT if ctx.cmd.fid() == FEAT_NQUEUES => {
                // Zero-based submission and completion queue counts
                ctx.cpl.cdw0 = 63 | 63 << 16;
                Ok(())
            }
            ADM_OPC_GFEAT => {
                debug!(fid = ctx.cmd.fid(), "unsupported feature");
                Err(Error::ENOSYS)
            }
            opcode => {
                debug!(opcode, "unsupported admin opcode");
                Err(Error::ENOSYS)
            }
        }
    }
}

enum Xfer {
    Read(usize),
    Write(usize),
    /// Nothing to move: a flush, or a command that already failed
    None,
}

struct RamSync;

impl RamSync {
    /// Decide where a transfer of `nbytes` goes, failing the command through
    /// its status if it doesn't fit.
    fn locate(ctx: &mut CmdCtx<'_>, state: &RamdiskState, nbytes: usize)
        -> Result<Xfer>
    {
        let opcode = ctx.cmd.opcode;
        let status = match opcode {
            NVM_OPC_READ | NVM_OPC_WRITE => {
                let geo = ctx.dev().geo()?;
                check_nvm_xfer(&ctx.cmd, geo, nbytes)
                    .map(Err)
                    .unwrap_or(Ok((ctx.cmd.slba() << geo.ssw) as usize))
            }
            FS_OPC_READ | FS_OPC_WRITE => {
                check_fs_xfer(&ctx.cmd, state.size() as u64, nbytes)
                    .map(Err)
                    .unwrap_or(Ok(ctx.cmd.slba() as usize))
            }
            NVM_OPC_FLUSH | FS_OPC_FLUSH => return Ok(Xfer::None),
            _ => {
                debug!(opcode, "unsupported I/O opcode");
                return Err(Error::ENOSYS);
            }
        };
        match status {
            Ok(ofs) if matches!(opcode, NVM_OPC_WRITE | FS_OPC_WRITE) => {
                Ok(Xfer::Write(ofs))
            }
            Ok(ofs) => Ok(Xfer::Read(ofs)),
            Err(status) => {
                debug!(opcode, slba = ctx.cmd.slba(), nbytes,
                       "rejected transfer");
                ctx.cpl.status = status;
                Ok(Xfer::None)
            }
        }
    }
}

impl SyncMixin for RamSync {
    fn name(&self) -> &'static str {
        "ramdisk"
    }

    fn cmd_io(&self, ctx: &mut CmdCtx<'_>, data: Option<&mut [u8]>,
              _meta: Option<&mut [u8]>) -> Result<()>
    {
        let state = ctx.dev().state::<RamdiskState>()?;
        let nbytes = data.as_ref().map_or(0, |d| d.len());
        let xfer = RamSync::locate(ctx, state, nbytes)?;
        let Some(data) = data else {
            return match xfer {
                Xfer::None => Ok(()),
                _ => Err(Error::EINVAL),
            };
        };
        let mut mem = state.mem.lock().map_err(|_| Error::EIO)?;
        match xfer {
            Xfer::Read(ofs) => data.copy_from_slice(&mem[ofs..ofs + nbytes]),
            Xfer::Write(ofs) => mem[ofs..ofs + nbytes].copy_from_slice(data),
            Xfer::None => (),
        }
        Ok(())
    }

    fn cmd_iov(&self, ctx: &mut CmdCtx<'_>, data: &mut [IoSliceMut<'_>],
               _meta: &mut [IoSliceMut<'_>]) -> Result<()>
    {
        let state = ctx.dev().state::<RamdiskState>()?;
        let nbytes = data.iter().map(|s| s.len()).sum();
        let xfer = RamSync::locate(ctx, state, nbytes)?;
        let mut mem = state.mem.lock().map_err(|_| Error::EIO)?;
        match xfer {
            Xfer::Read(mut ofs) => {
                for seg in data.iter_mut() {
                    let len = seg.len();
                    seg.copy_from_slice(&mem[ofs..ofs + len]);
                    ofs += len;
                }
            }
            Xfer::Write(mut ofs) => {
                for seg in data.iter() {
                    mem[ofs..ofs + seg.len()].copy_from_slice(seg);
                    ofs += seg.len();
                }
            }
            Xfer::None => (),
        }
        Ok(())
    }
}

pub fn backend() -> Backend {
    Backend {
        name: "ramdisk",
        schemes: &["ram", "file"],
        enabled: true,
        mixins: vec![
            Mixin::Mem(Arc::new(mem::Posix)),
            Mixin::Async(Arc::new(emu::Emu)),
            Mixin::Async(Arc::new(emu::Nil)),
            Mixin::Sync(Arc::new(RamSync)),
            Mixin::Admin(Arc::new(RamAdmin)),
            Mixin::Dev(Arc::new(RamDev)),
        ],
    }
}

// LCOV_EXCL_STOP
