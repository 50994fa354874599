// vim: tw=80
//! Device handles

use crate::{
    adm,
    be::{Bound, DevState, Registry},
    buf::Buf,
    cmd::CmdCtx,
    geo::{self, Geo},
    ident::{DevType, Ident},
    idfy::{FsIdfyCtrlr, FsIdfyNs, Idfy, IdfyCtrlr, IdfyNs, ZnsIdfyNs},
    opts::Opts,
    spec::Csi,
    types::*,
};
use std::{fmt, sync::OnceLock};
use tracing::debug;

/// An open device
///
/// Identify data and geometry are fetched from the device the first time
/// they're needed, and cached for the life of the handle.
pub struct Device {
    ident: Ident,
    opts: Opts,
    be: Bound,
    state: Option<Box<dyn DevState>>,
    idfy: OnceLock<Idfy>,
    geo: OnceLock<Geo>,
}

impl Device {
    pub(crate) fn new(ident: Ident, mut opts: Opts, be: Bound,
                      state: Box<dyn DevState>) -> Self
    {
        opts.be = Some(be.name.to_string());
        opts.dev = Some(be.dev.name().to_string());
        opts.mem = Some(be.mem.name().to_string());
        opts.sync = Some(be.sync.name().to_string());
        opts.async_ = Some(be.async_.name().to_string());
        opts.admin = Some(be.admin.name().to_string());
        Device {
            ident,
            opts,
            be,
            state: Some(state),
            idfy: OnceLock::new(),
            geo: OnceLock::new(),
        }
    }

    /// Open a device with the built-in backends.
    pub fn open(uri: &str, opts: &Opts) -> Result<Self> {
        Registry::global().open(uri, opts)
    }

    /// Open a device with an explicit set of backends.
    pub fn open_with(registry: &Registry, uri: &str, opts: &Opts)
        -> Result<Self>
    {
        registry.open(uri, opts)
    }

    /// Release the device.  Equivalent to dropping it.
    pub fn close(self) {
        drop(self)
    }

    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    /// The options the device was opened with, including the names of the
    /// selected backend and mixins
    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn be_name(&self) -> &'static str {
        self.be.name
    }

    pub fn bound(&self) -> &Bound {
        &self.be
    }

    pub fn nsid(&self) -> NsidT {
        self.ident.nsid
    }

    pub fn dtype(&self) -> DevType {
        self.ident.dtype
    }

    /// The backend's private state, if it is of type `T`.
    pub fn state<T: DevState>(&self) -> Result<&T> {
        self.state.as_deref()
            .ok_or(Error::EBADF)?
            .downcast_ref::<T>()
            .map_err(|_| Error::EINVAL)
    }

    /// Identify data, probing the device on first use.
    pub fn idfy(&self) -> Result<&Idfy> {
        if let Some(idfy) = self.idfy.get() {
            return Ok(idfy);
        }
        let idfy = probe(self)?;
        Ok(self.idfy.get_or_init(|| idfy))
    }

    /// Geometry, deriving it on first use.
    pub fn geo(&self) -> Result<&Geo> {
        if let Some(geo) = self.geo.get() {
            return Ok(geo);
        }
        let geo = geo::derive(self, self.idfy()?)?;
        debug!(?geo, "derived geometry");
        Ok(self.geo.get_or_init(|| geo))
    }

    /// The command set the device was classified as
    pub fn csi(&self) -> Result<Csi> {
        Ok(self.idfy()?.csi())
    }

    pub fn ctrlr(&self) -> Result<IdfyCtrlr<&[u8]>> {
        Ok(self.idfy()?.ctrlr())
    }

    pub fn ns(&self) -> Result<IdfyNs<&[u8]>> {
        Ok(self.idfy()?.ns())
    }

    pub fn ctrlr_css(&self) -> Result<&[u8]> {
        Ok(self.idfy()?.ctrlr_css())
    }

    pub fn ns_css(&self) -> Result<&[u8]> {
        Ok(self.idfy()?.ns_css())
    }

    /// Allocate a buffer suitable for this device's data transfers.
    pub fn buf_alloc(&self, nbytes: usize) -> Result<Buf> {
        self.be.mem.buf_alloc(self, nbytes)
    }

    pub fn buf_realloc(&self, buf: Buf, nbytes: usize) -> Result<Buf> {
        self.be.mem.buf_realloc(self, buf, nbytes)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.be.dev.dev_close(state);
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("ident", &self.ident)
            .field("be", &self.be)
            .field("geo", &self.geo.get())
            .finish()
    }
}

/// Run one identify command into `buf`.  A failed completion is an error.
fn idfy_into<F>(dev: &Device, buf: &mut [u8], f: F) -> Result<()>
    where F: FnOnce(&mut CmdCtx<'_>, &mut [u8]) -> Result<()>
{
    let mut ctx = CmdCtx::from_dev(dev);
    f(&mut ctx, buf)?;
    if ctx.cpl.is_err() {
        return Err(Error::EIO);
    }
    Ok(())
}

/// Identify controller and namespace for a command set.  `Ok(false)` if the
/// device doesn't support it.
fn idfy_css(dev: &Device, idfy: &mut Idfy, csi: Csi) -> Result<bool> {
    let nsid = dev.nsid();
    let mut ctx = CmdCtx::from_dev(dev);
    let r = adm::idfy_ctrlr_csi(&mut ctx, csi, &mut idfy.ctrlr_css);
    if r.is_err() || ctx.cpl.is_err() {
        return Ok(false);
    }
    let r = adm::idfy_ns_csi(&mut ctx, nsid, csi, &mut idfy.ns_css);
    Ok(r.is_ok() && !ctx.cpl.is_err())
}

fn clear(idfy: &mut Idfy) {
    idfy.ctrlr_css.fill(0);
    idfy.ns_css.fill(0);
}

/// Identify the device and classify its command set.
///
/// Zoned, filesystem-like, and plain NVM are tried in that order.  A device
/// that matches none is assumed to be plain NVM.
fn probe(dev: &Device) -> Result<Idfy> {
    let nsid = dev.nsid();
    let mut idfy = Idfy::new();
    idfy_into(dev, &mut idfy.ctrlr, adm::idfy_ctrlr)?;
    idfy_into(dev, &mut idfy.ns, |ctx, buf| adm::idfy_ns(ctx, nsid, buf))?;

    if idfy_css(dev, &mut idfy, Csi::Zoned)? &&
        ZnsIdfyNs(&idfy.ns_css[..]).lbafe(0).zsze != 0
    {
        debug!(nsid, "zoned command set");
        idfy.csi = Csi::Zoned;
        return Ok(idfy);
    }
    clear(&mut idfy);

    if idfy_css(dev, &mut idfy, Csi::Fs)? &&
        FsIdfyCtrlr(&idfy.ctrlr_css[..]).is_valid() &&
        FsIdfyNs(&idfy.ns_css[..]).is_valid()
    {
        debug!(nsid, "filesystem-like command set");
        idfy.csi = Csi::Fs;
        return Ok(idfy);
    }
    clear(&mut idfy);

    let mut ctx = CmdCtx::from_dev(dev);
    let r = adm::idfy_ns_csi(&mut ctx, nsid, Csi::Nvm, &mut idfy.ns_css);
    if r.is_err() || ctx.cpl.is_err() {
        debug!(nsid, "no command set recognized; assuming NVM");
        clear(&mut idfy);
    } else {
        debug!(nsid, "NVM command set");
    }
    idfy.csi = Csi::Nvm;
    Ok(idfy)
}
