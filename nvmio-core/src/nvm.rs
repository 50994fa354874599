// vim: tw=80
//! NVM command set helpers

use crate::{
    cmd::CmdCtx,
    spec::{Cmd, NVM_OPC_READ, NVM_OPC_WRITE},
    types::*,
};
use tracing::debug;

/// Check that buffers exactly cover `nlb + 1` logical blocks.
pub(crate) fn check_bufs(ctx: &CmdCtx<'_>, nlb: u16, data: Option<&[u8]>,
                         meta: Option<&[u8]>) -> Result<()>
{
    let geo = ctx.dev().geo()?;
    let nblocks = usize::from(nlb) + 1;
    if let Some(data) = data {
        let expected = nblocks * geo.lba_nbytes as usize;
        if data.len() != expected {
            debug!(len = data.len(), expected, "data buffer size mismatch");
            return Err(Error::EINVAL);
        }
    }
    if let Some(meta) = meta {
        let expected = nblocks * geo.nbytes_oob as usize;
        if meta.len() != expected {
            debug!(len = meta.len(), expected, "metadata buffer size mismatch");
            return Err(Error::EINVAL);
        }
    }
    Ok(())
}

fn rw(ctx: &mut CmdCtx<'_>, opcode: u8, nsid: NsidT, slba: LbaT, nlb: u16,
      data: Option<&mut [u8]>, meta: Option<&mut [u8]>) -> Result<()>
{
    check_bufs(ctx, nlb, data.as_deref(), meta.as_deref())?;
    ctx.cmd = Cmd::nvm(opcode, nsid, slba, nlb);
    ctx.pass(data, meta)
}

/// Read `nlb + 1` blocks starting at `slba`.
pub fn read(ctx: &mut CmdCtx<'_>, nsid: NsidT, slba: LbaT, nlb: u16,
            data: Option<&mut [u8]>, meta: Option<&mut [u8]>) -> Result<()>
{
    rw(ctx, NVM_OPC_READ, nsid, slba, nlb, data, meta)
}

/// Write `nlb + 1` blocks starting at `slba`.
pub fn write(ctx: &mut CmdCtx<'_>, nsid: NsidT, slba: LbaT, nlb: u16,
             data: Option<&mut [u8]>, meta: Option<&mut [u8]>) -> Result<()>
{
    rw(ctx, NVM_OPC_WRITE, nsid, slba, nlb, data, meta)
}

pub fn flush(ctx: &mut CmdCtx<'_>, nsid: NsidT) -> Result<()> {
    ctx.cmd = Cmd::flush(nsid);
    ctx.pass(None, None)
}

// LCOV_EXCL_STOP
