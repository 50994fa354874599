// vim: tw=80
//! Backends and the mixins they are assembled from
//!
//! A backend offers an ordered list of mixins, each of one of five kinds.
//! Opening a device picks exactly one mixin of every kind from the first
//! backend that can supply all five and whose device-lifecycle mixin
//! succeeds in opening the device.

use crate::{
    buf::Buf,
    cmd::{CmdCtx, Payload},
    dev::Device,
    geo::Geo,
    ident::Ident,
    idfy::{FsIdfyCtrlr, FsIdfyNs, IdfyCtrlr, IdfyNs, Lbaf},
    opts::Opts,
    spec::*,
    types::*,
};
use downcast::{downcast, Any};
use lazy_static::lazy_static;
#[cfg(test)] use mockall::mock;
use std::{fmt, io::IoSliceMut, sync::Arc};
use tracing::{debug, warn};

pub mod emu;
pub mod mem;
pub mod posix;
pub mod ramdisk;

/// Ask the async engine to poll for completions instead of waiting on
/// interrupts
pub const QUEUE_IOPOLL: u32 = 0x1;
/// Ask the async engine to use a kernel-side submission poller
pub const QUEUE_SQPOLL: u32 = 0x2;

/// The capability slots a backend fills.  The discriminants form a bitmask.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MixinKind {
    Mem = 0x1,
    Admin = 0x2,
    Sync = 0x4,
    Async = 0x8,
    Dev = 0x10,
}

impl MixinKind {
    pub const ALL: [MixinKind; 5] = [
        MixinKind::Mem,
        MixinKind::Admin,
        MixinKind::Sync,
        MixinKind::Async,
        MixinKind::Dev,
    ];

    /// Bitmask of a backend that has a mixin of every kind
    pub const CONFIGURED: u8 = 0x1F;
}

/// Per-device state private to a backend
pub trait DevState: Any + Send + Sync {}

downcast!(dyn DevState);

/// Device lifecycle
pub trait DevMixin: Send + Sync {
    fn name(&self) -> &'static str;

    /// List the devices this backend can see.
    fn enumerate(&self, _sys_uri: Option<&str>, _opts: &Opts)
        -> Result<Vec<Ident>>
    {
        Err(Error::ENOSYS)
    }

    /// Open the device named by `ident`.
    ///
    /// On success, the backend must have set `ident`'s `dtype`, `csi`, and
    /// `nsid`.
    fn dev_open(&self, ident: &mut Ident, opts: &Opts)
        -> Result<Box<dyn DevState>>;

    /// Release whatever `dev_open` acquired.
    fn dev_close(&self, state: Box<dyn DevState>) {
        drop(state)
    }
}

/// Synchronous execution of I/O commands
///
/// Transport failures are returned as `Err`.  A command that executed but
/// failed must be reported through `ctx.cpl.status`, with an `Ok` return.
pub trait SyncMixin: Send + Sync {
    fn name(&self) -> &'static str;

    fn cmd_io(&self, ctx: &mut CmdCtx<'_>, data: Option<&mut [u8]>,
              meta: Option<&mut [u8]>) -> Result<()>;

    fn cmd_iov(&self, _ctx: &mut CmdCtx<'_>, _data: &mut [IoSliceMut<'_>],
               _meta: &mut [IoSliceMut<'_>]) -> Result<()>
    {
        Err(Error::ENOSYS)
    }
}

/// Synchronous execution of administrative commands
pub trait AdminMixin: Send + Sync {
    fn name(&self) -> &'static str;

    fn cmd_admin(&self, ctx: &mut CmdCtx<'_>, data: Option<&mut [u8]>,
                 meta: Option<&mut [u8]>) -> Result<()>;
}

/// Allocation of buffers suitable for a device's data transfers
pub trait MemMixin: Send + Sync {
    fn name(&self) -> &'static str;

    fn buf_alloc(&self, dev: &Device, nbytes: usize) -> Result<Buf>;

    fn buf_realloc(&self, _dev: &Device, buf: Buf, nbytes: usize)
        -> Result<Buf>
    {
        buf.realloc(nbytes)
    }
}

/// Asynchronous execution of I/O commands
pub trait AsyncMixin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create the engine behind one queue of `depth` entries.
    fn init(&self, dev: &Device, depth: u32, flags: u32)
        -> Result<Box<dyn AsyncEngine>>;
}

/// A command on its way into an async engine
#[derive(Debug)]
pub struct Request {
    /// Identifies the command's context within its queue
    pub tag: u16,
    pub cmd: Cmd,
    pub payload: Payload,
}

/// A command on its way out of an async engine
#[derive(Debug)]
pub struct Completion {
    pub tag: u16,
    pub cpl: Cpl,
    pub payload: Payload,
}

/// The per-queue half of an asynchronous mixin
pub trait AsyncEngine: Send {
    /// Submit a command.  On failure the request is handed back untouched.
    fn cmd_io(&mut self, dev: &Device, req: Request)
        -> std::result::Result<(), (Error, Request)>;

    /// Reap at most `max` completions into `done`, or all that are ready if
    /// `max` is 0.  Must not block.  Returns the number reaped.
    fn poke(&mut self, dev: &Device, max: u32, done: &mut Vec<Completion>)
        -> Result<u32>;

    fn term(&mut self, _dev: &Device) -> Result<()> {
        Ok(())
    }
}

/// One mixin, tagged by kind
#[derive(Clone)]
pub enum Mixin {
    Mem(Arc<dyn MemMixin>),
    Admin(Arc<dyn AdminMixin>),
    Sync(Arc<dyn SyncMixin>),
    Async(Arc<dyn AsyncMixin>),
    Dev(Arc<dyn DevMixin>),
}

impl Mixin {
    pub fn kind(&self) -> MixinKind {
        match self {
            Mixin::Mem(_) => MixinKind::Mem,
            Mixin::Admin(_) => MixinKind::Admin,
            Mixin::Sync(_) => MixinKind::Sync,
            Mixin::Async(_) => MixinKind::Async,
            Mixin::Dev(_) => MixinKind::Dev,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mixin::Mem(m) => m.name(),
            Mixin::Admin(m) => m.name(),
            Mixin::Sync(m) => m.name(),
            Mixin::Async(m) => m.name(),
            Mixin::Dev(m) => m.name(),
        }
    }
}

impl fmt::Debug for Mixin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind(), self.name())
    }
}

/// A backend whose mixins have been chosen.  One per open device.
#[derive(Clone)]
pub struct Bound {
    pub name: &'static str,
    pub mem: Arc<dyn MemMixin>,
    pub admin: Arc<dyn AdminMixin>,
    pub sync: Arc<dyn SyncMixin>,
    pub async_: Arc<dyn AsyncMixin>,
    pub dev: Arc<dyn DevMixin>,
}

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("name", &self.name)
            .field("mem", &self.mem.name())
            .field("admin", &self.admin.name())
            .field("sync", &self.sync.name())
            .field("async", &self.async_.name())
            .field("dev", &self.dev.name())
            .finish()
    }
}

/// Static description of a backend
#[derive(Clone, Debug)]
pub struct Backend {
    pub name: &'static str,
    /// URI schemes that this backend understands
    pub schemes: &'static [&'static str],
    pub enabled: bool,
    /// Offered mixins.  Within a kind, earlier entries take precedence.
    pub mixins: Vec<Mixin>,
}

impl Backend {
    /// Choose one mixin of each kind, honoring the names requested in
    /// `opts`.  Returns `None` if some kind can't be satisfied.
    pub fn setup(&self, opts: &Opts) -> Option<Bound> {
        let wanted = |m: &&Mixin| {
            opts.mixin_name(m.kind()).map_or(true, |name| name == m.name())
        };
        let mut setup = 0u8;
        let mut mem = None;
        let mut admin = None;
        let mut sync = None;
        let mut async_ = None;
        let mut dev = None;
        for mixin in self.mixins.iter().filter(wanted) {
            let kind = mixin.kind();
            if setup & kind as u8 != 0 {
                continue;
            }
            setup |= kind as u8;
            match mixin {
                Mixin::Mem(m) => mem = Some(m.clone()),
                Mixin::Admin(m) => admin = Some(m.clone()),
                Mixin::Sync(m) => sync = Some(m.clone()),
                Mixin::Async(m) => async_ = Some(m.clone()),
                Mixin::Dev(m) => dev = Some(m.clone()),
            }
        }
        if setup != MixinKind::CONFIGURED {
            debug!(be = self.name, setup, "backend not configured");
            return None;
        }
        Some(Bound {
            name: self.name,
            mem: mem?,
            admin: admin?,
            sync: sync?,
            async_: async_?,
            dev: dev?,
        })
    }
}

lazy_static! {
    static ref BUILTIN: Registry = Registry::builtin();
}

/// An ordered list of backends
#[derive(Clone, Debug, Default)]
pub struct Registry {
    backends: Vec<Backend>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Registry::default()
    }

    /// The backends compiled into this crate, in order of preference
    pub fn builtin() -> Self {
        let mut registry = Registry::new();
        registry.push(posix::backend());
        registry.push(ramdisk::backend());
        registry
    }

    /// A process-wide, read-only instance of [`Registry::builtin`]
    pub fn global() -> &'static Registry {
        &BUILTIN
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Append a backend, at the lowest priority.
    pub fn push(&mut self, be: Backend) {
        self.backends.push(be);
    }

    /// List every device that any enabled backend can see.
    ///
    /// Backends that don't support enumeration are skipped.
    pub fn enumerate<F>(&self, sys_uri: Option<&str>, opts: &Opts, mut cb: F)
        -> Result<()>
        where F: FnMut(&Ident)
    {
        for be in self.backends.iter().filter(|be| be.enabled) {
            if opts.be.as_deref().map_or(false, |name| name != be.name) {
                continue;
            }
            let Some(bound) = be.setup(opts) else { continue };
            match bound.dev.enumerate(sys_uri, opts) {
                Ok(idents) => idents.iter().for_each(&mut cb),
                Err(Error::ENOSYS) => {
                    debug!(be = be.name, "enumeration not supported");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Open a device through the first backend that accepts it.
    ///
    /// A permission error stops the search immediately.  Any other error
    /// moves on to the next backend.  If every backend declines, the last
    /// error is returned, or `ENXIO` if none produced one.
    #[tracing::instrument(skip(self, opts))]
    pub fn open(&self, uri: &str, opts: &Opts) -> Result<Device> {
        let ident = Ident::parse(uri)?;
        let mut opts = opts.clone();
        if let Some(uri_opts) = ident.opts() {
            opts.apply_uri_options(uri_opts)?;
        }

        let mut err = None;
        for be in self.backends.iter() {
            if !be.enabled {
                debug!(be = be.name, "skipping disabled backend");
                continue;
            }
            if opts.be.as_deref().map_or(false, |name| name != be.name) {
                continue;
            }
            if !be.schemes.contains(&ident.scheme()) {
                continue;
            }
            let Some(bound) = be.setup(&opts) else { continue };
            let mut candidate = ident.clone();
            match bound.dev.dev_open(&mut candidate, &opts) {
                Ok(state) => {
                    debug!(be = ?bound, "opened device");
                    return Ok(Device::new(candidate, opts, bound, state));
                }
                Err(Error::EPERM) => {
                    warn!(be = be.name, "permission denied; giving up");
                    return Err(Error::EPERM);
                }
                Err(e) => {
                    debug!(be = be.name, error = ?e, "backend declined");
                    err = Some(e);
                }
            }
        }
        debug!("no backend for device");
        Err(err.unwrap_or(Error::ENXIO))
    }
}

/// Validate the data transfer of a block-addressed I/O command against the
/// device's geometry.
///
/// Returns the completion status with which the command must fail, if any.
pub fn check_nvm_xfer(cmd: &Cmd, geo: &Geo, nbytes: usize) -> Option<Status>
{
    let nlb = u64::from(cmd.nlb()) + 1;
    let expected = nlb * u64::from(geo.lba_nbytes);
    let nlbas = geo.tbytes / u64::from(geo.nbytes);
    if cmd.slba().checked_add(nlb).map_or(true, |end| end > nlbas) {
        Some(Status::new(SCT_GENERIC, SC_LBA_OUT_OF_RANGE))
    } else if nbytes as u64 != expected {
        Some(Status::new(SCT_GENERIC, SC_INVALID_FIELD))
    } else {
        None
    }
}

/// Log2 of the sector size of emulated devices
pub(crate) const EMU_LBA_DS: u8 = 9;
/// MDTS of emulated devices.  Transfers of up to 1 MiB.
pub(crate) const EMU_MDTS: u8 = 8;
/// Largest transfer advertised for the emulated filesystem-like command set
const EMU_FS_IOSIZE_MAX: u32 = 128 << 20;

/// Answer an Identify command for a device of `nbytes` that has no
/// controller of its own.
///
/// The generic and filesystem-like structures are synthesized.  Any other
/// identify fails with Invalid Field, which classifies the device as
/// filesystem-like.
pub(crate) fn idfy_emulated(ctx: &mut CmdCtx<'_>, nbytes: u64, mn: &str,
                            buf: &mut [u8]) -> Result<()>
{
    let buf = buf.get_mut(..IDFY_NBYTES).ok_or(Error::EINVAL)?;
    buf.fill(0);
    match (ctx.cmd.cns(), ctx.cmd.idfy_csi()) {
        (IDFY_CTRLR, _) => {
            let mut ctrlr = IdfyCtrlr(&mut *buf);
            ctrlr.set_mdts(EMU_MDTS);
            ctrlr.set_mn(mn);
        }
        (IDFY_NS, _) => {
            let mut ns = IdfyNs(&mut *buf);
            let nlbas = nbytes >> EMU_LBA_DS;
            ns.set_sizes(nlbas, nlbas, nlbas);
            ns.set_flbas(0, false);
            ns.set_lbaf(0, Lbaf { ms: 0, ds: EMU_LBA_DS, rp: 0 });
        }
        (IDFY_CTRLR_IOCS, Csi::Fs) => {
            FsIdfyCtrlr(&mut *buf).emulate(EMU_FS_IOSIZE_MAX)
        }
        (IDFY_NS_IOCS, Csi::Fs) => FsIdfyNs(&mut *buf).emulate(nbytes),
        (cns, csi) => {
            debug!(cns, ?csi, "unsupported identify");
            ctx.cpl.status = Status::new(SCT_GENERIC, SC_INVALID_FIELD);
        }
    }
    Ok(())
}

/// Validate the byte range of a byte-addressed I/O command against the
/// device's capacity.
pub fn check_fs_xfer(cmd: &Cmd, capacity: u64, nbytes: usize)
    -> Option<Status>
{
    let end = cmd.slba().checked_add(nbytes as u64);
    if end.map_or(true, |end| end > capacity) {
        Some(Status::new(SCT_GENERIC, SC_LBA_OUT_OF_RANGE))
    } else {
        None
    }
}

#[cfg(test)]
mock! {
    pub DevMx {}
    impl DevMixin for DevMx {
        fn name(&self) -> &'static str;
        fn enumerate<'a>(&self, sys_uri: Option<&'a str>, opts: &Opts)
            -> Result<Vec<Ident>>;
        fn dev_open(&self, ident: &mut Ident, opts: &Opts)
            -> Result<Box<dyn DevState>>;
        fn dev_close(&self, state: Box<dyn DevState>);
    }
}

#[cfg(test)]
mock! {
    pub MemMx {}
    impl MemMixin for MemMx {
        fn name(&self) -> &'static str;
        fn buf_alloc(&self, dev: &Device, nbytes: usize) -> Result<Buf>;
        fn buf_realloc(&self, dev: &Device, buf: Buf, nbytes: usize)
            -> Result<Buf>;
    }
}

#[cfg(test)]
mock! {
    pub AsyncMx {}
    impl AsyncMixin for AsyncMx {
        fn name(&self) -> &'static str;
        fn init(&self, dev: &Device, depth: u32, flags: u32)
            -> Result<Box<dyn AsyncEngine>>;
    }
}

// LCOV_EXCL_STOP
