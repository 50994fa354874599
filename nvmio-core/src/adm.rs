// vim: tw=80
//! Administrative command helpers
//!
//! Each helper fills in `ctx.cmd` and executes it synchronously.  As with
//! [`CmdCtx::pass_admin`], an `Ok` return only means the command reached the
//! device; its status is in `ctx.cpl`.

use crate::{
    cmd::CmdCtx,
    spec::{Cmd, Csi, IDFY_CTRLR, IDFY_CTRLR_IOCS, IDFY_NBYTES, IDFY_NS,
           IDFY_NS_IOCS},
    types::*,
};
use tracing::debug;

/// The identify data structure occupies the first [`IDFY_NBYTES`] of `buf`
fn idfy_buf(buf: &mut [u8]) -> Result<&mut [u8]> {
    if buf.len() < IDFY_NBYTES {
        debug!(len = buf.len(), "identify buffer too small");
        return Err(Error::EINVAL);
    }
    Ok(&mut buf[..IDFY_NBYTES])
}

/// A namespace id of 0 means the device's own namespace
fn nsid_or_dev(ctx: &CmdCtx<'_>, nsid: NsidT) -> NsidT {
    if nsid == 0 {
        ctx.dev().nsid()
    } else {
        nsid
    }
}

/// Identify, with every field up to the caller
pub fn idfy(ctx: &mut CmdCtx<'_>, cns: u8, cntid: u16, nsid: NsidT, csi: Csi,
            buf: &mut [u8]) -> Result<()>
{
    let buf = idfy_buf(buf)?;
    ctx.cmd = Cmd::idfy(cns, cntid, nsid, csi);
    ctx.pass_admin(Some(buf), None)
}

pub fn idfy_ctrlr(ctx: &mut CmdCtx<'_>, buf: &mut [u8]) -> Result<()> {
    idfy(ctx, IDFY_CTRLR, 0, 0, Csi::Nvm, buf)
}

/// Identify controller, command-set specific
pub fn idfy_ctrlr_csi(ctx: &mut CmdCtx<'_>, csi: Csi, buf: &mut [u8])
    -> Result<()>
{
    idfy(ctx, IDFY_CTRLR_IOCS, 0, 0, csi, buf)
}

pub fn idfy_ns(ctx: &mut CmdCtx<'_>, nsid: NsidT, buf: &mut [u8])
    -> Result<()>
{
    let nsid = nsid_or_dev(ctx, nsid);
    idfy(ctx, IDFY_NS, 0, nsid, Csi::Nvm, buf)
}

/// Identify namespace, command-set specific
pub fn idfy_ns_csi(ctx: &mut CmdCtx<'_>, nsid: NsidT, csi: Csi,
                   buf: &mut [u8]) -> Result<()>
{
    let nsid = nsid_or_dev(ctx, nsid);
    idfy(ctx, IDFY_NS_IOCS, 0, nsid, csi, buf)
}

/// Get Features.  Most features return their value in `ctx.cpl.cdw0`, and
/// need no buffer.
pub fn gfeat(ctx: &mut CmdCtx<'_>, nsid: NsidT, fid: u8, sel: u8,
             buf: Option<&mut [u8]>) -> Result<()>
{
    ctx.cmd = Cmd::gfeat(nsid, fid, sel);
    ctx.pass_admin(buf, None)
}

/// Get Log Page, reading `buf.len()` bytes starting `ofst` bytes into the
/// page.  `buf` is zeroed first.
pub fn log(ctx: &mut CmdCtx<'_>, nsid: NsidT, lid: u8, lsp: u8, ofst: u64,
           buf: &mut [u8]) -> Result<()>
{
    if buf.is_empty() || buf.len() % 4 != 0 {
        debug!(len = buf.len(), "log buffer is not a whole number of dwords");
        return Err(Error::EINVAL);
    }
    if ofst % 4 != 0 {
        debug!(ofst, "unaligned log page offset");
        return Err(Error::EINVAL);
    }
    buf.fill(0);
    ctx.cmd = Cmd::log(nsid, lid, lsp, ofst, buf.len())?;
    ctx.pass_admin(Some(buf), None)
}

// LCOV_EXCL_STOP
