// vim: tw=80
//! Regular files and block devices, through portable system calls
//!
//! Files have no controller, so the `shim` admin mixin synthesizes identify
//! data from their size.  They are classified as filesystem-like, and accept
//! both block-addressed and byte-addressed I/O.

use super::{
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
use cfg_if::cfg_if;
use nix::{
    libc::off_t,
    sys::uio::{pread, preadv, pwrite, pwritev},
};
use std::{
    fs::{File, OpenOptions},
    io::{IoSlice, IoSliceMut},
    os::unix::{
        fs::{FileTypeExt, OpenOptionsExt},
        io::AsRawFd,
    },
    sync::Arc,
};
use tracing::{debug, trace};

/// FFI definitions that don't belong in libc.
#[doc(hidden)]
mod ffi {
    use cfg_if::cfg_if;

    cfg_if! {
        if #[cfg(target_os = "linux")] {
            nix::ioctl_read! {
                /// Size of a block device in bytes
                #[doc(hidden)]
                blkgetsize64, 0x12, 114, u64
            }
        } else if #[cfg(target_os = "freebsd")] {
            nix::ioctl_read! {
                /// Size of a GEOM provider in bytes
                #[doc(hidden)]
                diocgmediasize, b'd', 129, nix::libc::off_t
            }
        }
    }
}

/// An open file or device node
#[derive(Debug)]
pub struct PosixState {
    file: File,
    /// Is it a device node, rather than a regular file?
    blkdev: bool,
}

impl DevState for PosixState {}

impl PosixState {
    /// Current size in bytes
    pub fn size(&self) -> Result<u64> {
        if !self.blkdev {
            return Ok(self.file.metadata()?.len());
        }
        cfg_if! {
            if #[cfg(target_os = "linux")] {
                let mut size = 0u64;
                unsafe { ffi::blkgetsize64(self.file.as_raw_fd(), &mut size) }?;
                Ok(size)
            } else if #[cfg(target_os = "freebsd")] {
                let mut size: off_t = 0;
                unsafe {
                    ffi::diocgmediasize(self.file.as_raw_fd(), &mut size)
                }?;
                Ok(size as u64)
            } else {
                Err(Error::ENOSYS)
            }
        }
    }
}

struct PosixDev;

impl PosixDev {
    fn open_options(opts: &Opts) -> OpenOptions {
        let mut oo = OpenOptions::new();
        if opts.rdonly {
            oo.read(true);
        } else if opts.wronly {
            oo.write(true);
        } else {
            oo.read(true).write(opts.rdwr);
        }
        if opts.create || opts.truncate {
            // Both require write access
            oo.write(true);
        }
        oo.create(opts.create)
            .truncate(opts.truncate)
            .mode(opts.create_mode);
        if opts.direct {
            trace!("direct I/O is not used by the posix backend");
        }
        oo
    }
}

impl DevMixin for PosixDev {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn dev_open(&self, ident: &mut Ident, opts: &Opts)
        -> Result<Box<dyn DevState>>
    {
        let file = PosixDev::open_options(opts)
            .custom_flags(nix::libc::O_CLOEXEC)
            .open(ident.target())
            .map_err(|e| {
                debug!(%ident, error = %e, "open failed");
                Error::from(e)
            })?;
        let ft = file.metadata()?.file_type();
        let (dtype, blkdev) = if ft.is_file() {
            (DevType::FsFile, false)
        } else if ft.is_block_device() ||
            (cfg!(target_os = "freebsd") && ft.is_char_device())
        {
            (DevType::BlockDevice, true)
        } else if ft.is_char_device() {
            debug!(%ident, "character device treated as a file");
            (DevType::FsFile, false)
        } else {
            debug!(%ident, ?ft, "unsupported file type");
            return Err(Error::EINVAL);
        };
        ident.dtype = dtype;
        ident.csi = Csi::Fs;
        ident.nsid = 1;
        Ok(Box::new(PosixState { file, blkdev }))
    }
}

/// Emulated administrative commands
struct Shim;

impl AdminMixin for Shim {
    fn name(&self) -> &'static str {
        "shim"
    }

    fn cmd_admin(&self, ctx: &mut CmdCtx<'_>, data: Option<&mut [u8]>,
                 _meta: Option<&mut [u8]>) -> Result<()>
    {
        match ctx.cmd.opcode {
            ADM_OPC_IDFY => {
                let buf = data.ok_or(Error::EINVAL)?;
                let size = ctx.dev().state::<PosixState>()?.size()?;
                idfy_emulated(ctx, size, "nvmio posix", buf)
            }
            opcode => {
                debug!(opcode, "unsupported admin opcode");
                Err(Error::ENOSYS)
            }
        }
    }
}

/// Where an I/O command goes in the file
enum Xfer {
    Read(off_t),
    Write(off_t),
    Flush,
}

/// Synchronous I/O with `pread(2)` and friends
struct Psync;

impl Psync {
    fn locate(ctx: &mut CmdCtx<'_>, nbytes: usize) -> Result<Option<Xfer>> {
        let opcode = ctx.cmd.opcode;
        let ofs = match opcode {
            NVM_OPC_READ | NVM_OPC_WRITE => {
                let geo = ctx.dev().geo()?;
                if let Some(status) = check_nvm_xfer(&ctx.cmd, geo, nbytes) {
                    debug!(opcode, slba = ctx.cmd.slba(), nbytes,
                           "rejected transfer");
                    ctx.cpl.status = status;
                    return Ok(None);
                }
                ctx.cmd.slba() << geo.ssw
            }
            // Files grow on demand
            FS_OPC_READ | FS_OPC_WRITE => ctx.cmd.slba(),
            NVM_OPC_FLUSH | FS_OPC_FLUSH => return Ok(Some(Xfer::Flush)),
            _ => {
                debug!(opcode, "unsupported I/O opcode");
                return Err(Error::ENOSYS);
            }
        };
        let ofs = off_t::try_from(ofs).map_err(|_| Error::EINVAL)?;
        Ok(Some(match opcode {
            NVM_OPC_WRITE | FS_OPC_WRITE => Xfer::Write(ofs),
            _ => Xfer::Read(ofs),
        }))
    }

    /// Record a failed system call in the completion, and return it.
    fn fail(ctx: &mut CmdCtx<'_>, e: Error) -> Result<()> {
        ctx.cpl.status = Status::new(SCT_VENDOR, i32::from(e) as u16 & 0xFF);
        Err(e)
    }
}

/// Read until `buf` is full.  Anything past the end of the file reads as
/// zeros.
fn pread_all(file: &File, mut buf: &mut [u8], mut ofs: off_t) -> Result<()> {
    while !buf.is_empty() {
        let n = pread(file, buf, ofs)?;
        if n == 0 {
            buf.fill(0);
            break;
        }
        buf = &mut buf[n..];
        ofs += n as off_t;
    }
    Ok(())
}

fn pwrite_all(file: &File, mut buf: &[u8], mut ofs: off_t) -> Result<()> {
    while !buf.is_empty() {
        let n = pwrite(file, buf, ofs)?;
        if n == 0 {
            return Err(Error::EIO);
        }
        buf = &buf[n..];
        ofs += n as off_t;
    }
    Ok(())
}

impl SyncMixin for Psync {
    fn name(&self) -> &'static str {
        "psync"
    }

    fn cmd_io(&self, ctx: &mut CmdCtx<'_>, data: Option<&mut [u8]>,
              _meta: Option<&mut [u8]>) -> Result<()>
    {
        let state = ctx.dev().state::<PosixState>()?;
        let nbytes = data.as_ref().map_or(0, |d| d.len());
        let r = match (Psync::locate(ctx, nbytes)?, data) {
            (None, _) => Ok(()),
            (Some(Xfer::Flush), _) => {
                state.file.sync_all().map_err(Error::from)
            }
            (Some(Xfer::Read(ofs)), Some(data)) => {
                pread_all(&state.file, data, ofs)
            }
            (Some(Xfer::Write(ofs)), Some(data)) => {
                pwrite_all(&state.file, data, ofs)
            }
            (Some(_), None) => return Err(Error::EINVAL),
        };
        r.or_else(|e| Psync::fail(ctx, e))
    }

    fn cmd_iov(&self, ctx: &mut CmdCtx<'_>, data: &mut [IoSliceMut<'_>],
               _meta: &mut [IoSliceMut<'_>]) -> Result<()>
    {
        let state = ctx.dev().state::<PosixState>()?;
        let nbytes: usize = data.iter().map(|s| s.len()).sum();
        let r = match Psync::locate(ctx, nbytes)? {
            None => return Ok(()),
            Some(Xfer::Flush) => state.file.sync_all().map_err(Error::from),
            Some(Xfer::Read(ofs)) => {
                preadv(&state.file, data, ofs).map_err(Error::from)
                    .and_then(|n| {
                        // A short read means end of file
                        if n < nbytes {
                            zero_from(data, n);
                        }
                        Ok(())
                    })
            }
            Some(Xfer::Write(ofs)) => {
                let iov = data.iter().map(|s| IoSlice::new(s))
                    .collect::<Vec<_>>();
                pwritev(&state.file, &iov, ofs).map_err(Error::from)
                    .and_then(|n| {
                        if n < nbytes { Err(Error::EIO) } else { Ok(()) }
                    })
            }
        };
        r.or_else(|e| Psync::fail(ctx, e))
    }
}

/// Zero every byte of `iov` beyond the first `n`.
fn zero_from(iov: &mut [IoSliceMut<'_>], mut n: usize) {
    for seg in iov.iter_mut() {
        let skip = n.min(seg.len());
        seg[skip..].fill(0);
        n -= skip;
    }
}

pub fn backend() -> Backend {
    Backend {
        name: "posix",
        schemes: &["file"],
        enabled: true,
        mixins: vec![
            Mixin::Mem(Arc::new(mem::Posix)),
            Mixin::Async(Arc::new(emu::Emu)),
            Mixin::Async(Arc::new(emu::Nil)),
            Mixin::Sync(Arc::new(Psync)),
            Mixin::Admin(Arc::new(Shim)),
            Mixin::Dev(Arc::new(PosixDev)),
        ],
    }
}

// LCOV_EXCL_STOP
