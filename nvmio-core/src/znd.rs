// vim: tw=80
//! Zoned namespace commands and zone reports

use crate::{
    buf::Buf,
    cmd::CmdCtx,
    dev::Device,
    geo::GeoType,
    nvm,
    spec::*,
    types::*,
};
use std::fmt;
use tracing::{debug, trace};

/// Size in bytes of the descriptor extensions of the device's active format
fn zdext_nbytes(dev: &Device) -> Result<usize> {
    let idfy = dev.idfy()?;
    let format = idfy.ns().flbas_format();
    Ok(usize::from(idfy.zns().lbafe(format).zdes) * 64)
}

/// Zone Management Receive into `buf`, whose length must be a non-zero
/// multiple of four bytes.
pub fn mgmt_recv(ctx: &mut CmdCtx<'_>, nsid: NsidT, slba: LbaT, zra: u8,
                 zrasf: u8, partial: bool, buf: &mut [u8]) -> Result<()>
{
    if buf.is_empty() || buf.len() % 4 != 0 {
        return Err(Error::EINVAL);
    }
    ctx.cmd = Cmd::mgmt_recv(nsid, slba, zra, zrasf, partial, buf.len())?;
    ctx.pass(Some(buf), None)
}

/// Zone Management Send.
///
/// `ext`, if given, is a zone descriptor extension for the device's active
/// format, to be associated with the zone.
pub fn mgmt_send(ctx: &mut CmdCtx<'_>, nsid: NsidT, zslba: LbaT,
                 select_all: bool, zsa: u8, ext: Option<&mut [u8]>)
    -> Result<()>
{
    if let Some(ext) = ext.as_deref() {
        let expected = zdext_nbytes(ctx.dev())?;
        if expected == 0 || ext.len() != expected {
            debug!(len = ext.len(), expected, "bad descriptor extension");
            return Err(Error::EINVAL);
        }
    }
    ctx.cmd = Cmd::mgmt_send(nsid, zslba, zsa, select_all);
    ctx.pass(ext, None)
}

/// Zone Append.  On success the LBA written is in `ctx.cpl.result()`.
pub fn append(ctx: &mut CmdCtx<'_>, nsid: NsidT, zslba: LbaT, nlb: u16,
              data: Option<&mut [u8]>, meta: Option<&mut [u8]>) -> Result<()>
{
    nvm::check_bufs(ctx, nlb, data.as_deref(), meta.as_deref())?;
    ctx.cmd = Cmd::append(nsid, zslba, nlb);
    ctx.pass(data, meta)
}

/// Fetch a report header, and nothing else.
fn report_hdr(dev: &Device, slba: LbaT, zrasf: u8, nentries: usize)
    -> Result<Buf>
{
    let mut buf = dev.buf_alloc(
        ZND_REPORT_HDR_NBYTES + nentries * ZND_DESCR_NBYTES)?;
    buf.fill(0);
    let mut ctx = CmdCtx::from_dev(dev);
    mgmt_recv(&mut ctx, dev.nsid(), slba, ZND_RECV_REPORT, zrasf, false,
              &mut buf)?;
    if ctx.cpl.is_err() {
        debug!(status = ctx.cpl.status.raw(), "zone report failed");
        return Err(Error::EIO);
    }
    Ok(buf)
}

/// Count the zones matching `zrasf`, without using the device's geometry.
pub fn stat(dev: &Device, zrasf: u8) -> Result<u64> {
    let buf = report_hdr(dev, 0, zrasf, 0)?;
    Ok(report_hdr_nzones(&buf))
}

/// The descriptor of the zone containing `slba`
pub fn descr_from_dev(dev: &Device, slba: LbaT) -> Result<ZoneDescr> {
    let buf = report_hdr(dev, slba, ZND_RECV_SF_ALL, 1)?;
    if report_hdr_nzones(&buf) == 0 {
        debug!(slba, "no zone reported");
        return Err(Error::EIO);
    }
    Ok(ZoneDescr::from_bytes(&buf[ZND_REPORT_HDR_NBYTES..]))
}

/// A contiguous run of zone descriptors, optionally with their extensions
#[derive(Clone, Eq, PartialEq)]
pub struct ZoneReport {
    /// Number of zones on the device
    pub nzones: u64,
    pub zd_nbytes: usize,
    pub zdext_nbytes: usize,
    /// Start LBA of the first zone in the report
    pub zslba: LbaT,
    /// Start LBA of the last zone in the report
    pub zelba: LbaT,
    pub nentries: usize,
    pub extended: bool,
    /// Stride of `entries`: a descriptor plus its extension, if any
    pub zrent_nbytes: usize,
    pub entries: Vec<u8>,
}

impl ZoneReport {
    fn entry(&self, i: usize) -> Option<&[u8]> {
        if i >= self.nentries {
            return None;
        }
        let start = i * self.zrent_nbytes;
        self.entries.get(start..start + self.zrent_nbytes)
    }

    pub fn descr(&self, i: usize) -> Option<ZoneDescr> {
        self.entry(i).map(ZoneDescr::from_bytes)
    }

    /// The descriptor extension of entry `i`, in an extended report
    pub fn ext(&self, i: usize) -> Option<&[u8]> {
        if !self.extended {
            return None;
        }
        self.entry(i).map(|e| &e[self.zd_nbytes..])
    }

    pub fn iter(&self) -> impl Iterator<Item=ZoneDescr> + '_ {
        (0..self.nentries).filter_map(move |i| self.descr(i))
    }
}

impl fmt::Debug for ZoneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneReport")
            .field("nzones", &self.nzones)
            .field("zslba", &self.zslba)
            .field("zelba", &self.zelba)
            .field("nentries", &self.nentries)
            .field("extended", &self.extended)
            .field("zrent_nbytes", &self.zrent_nbytes)
            .finish()
    }
}

/// Retrieve the descriptors of `limit` zones starting with the one that
/// contains `slba`.  A `limit` of 0 means every zone from there on.
///
/// The report is assembled from as many Zone Management Receive commands as
/// the device's transfer limit requires.
#[tracing::instrument(skip(dev))]
pub fn report_from_dev(dev: &Device, slba: LbaT, limit: usize,
                       extended: bool) -> Result<ZoneReport>
{
    let geo = dev.geo()?;
    if geo.geo_type != GeoType::Zoned || geo.nsect == 0 {
        debug!(geo_type = ?geo.geo_type, "not a zoned device");
        return Err(Error::EINVAL);
    }
    let zdext_nbytes = zdext_nbytes(dev)?;
    if extended && zdext_nbytes == 0 {
        debug!("device lacks descriptor extensions");
        return Err(Error::ENOSYS);
    }

    let first = slba / geo.nsect;
    let zslba = first * geo.nsect;
    let remaining = u64::from(geo.nzone).checked_sub(first)
        .filter(|&r| r > 0)
        .ok_or(Error::EINVAL)?;
    let nentries = match limit as u64 {
        0 => remaining,
        n if n <= remaining => n,
        n => {
            debug!(n, remaining, "limit exceeds the zones remaining");
            return Err(Error::EINVAL);
        }
    } as usize;

    let zd_nbytes = ZND_DESCR_NBYTES;
    let zrent_nbytes = if extended {
        zd_nbytes + zdext_nbytes
    } else {
        zd_nbytes
    };
    // The largest whole number of entries that fits, with the header, in one
    // transfer
    let chunk_max = usize::try_from(geo.mdts_nbytes)
        .unwrap_or(usize::MAX)
        .saturating_sub(ZND_REPORT_HDR_NBYTES) / zrent_nbytes;
    if chunk_max == 0 {
        debug!(mdts_nbytes = geo.mdts_nbytes, "transfer limit too small");
        return Err(Error::EINVAL);
    }
    let chunk_max = chunk_max.min(nentries);
    let zra = if extended { ZND_RECV_EREPORT } else { ZND_RECV_REPORT };

    let mut entries = vec![0u8; nentries * zrent_nbytes];
    let mut scratch = dev.buf_alloc(
        ZND_REPORT_HDR_NBYTES + chunk_max * zrent_nbytes)?;
    let mut ctx = CmdCtx::from_dev(dev);
    let mut done = 0usize;
    while done < nentries {
        let want = chunk_max.min(nentries - done);
        let chunk_slba = zslba + done as u64 * geo.nsect;
        let xfer = &mut scratch[..ZND_REPORT_HDR_NBYTES + want * zrent_nbytes];
        xfer.fill(0);
        mgmt_recv(&mut ctx, dev.nsid(), chunk_slba, zra, ZND_RECV_SF_ALL,
                  false, xfer)?;
        if ctx.cpl.is_err() {
            debug!(status = ctx.cpl.status.raw(), chunk_slba,
                   "zone report failed");
            return Err(Error::EIO);
        }
        let reported = report_hdr_nzones(xfer);
        if reported == 0 {
            debug!(chunk_slba, "no zones reported");
            return Err(Error::EIO);
        }
        let got = usize::try_from(reported).map_or(want, |r| r.min(want));
        trace!(chunk_slba, want, got, "zone report chunk");
        let src = &xfer[ZND_REPORT_HDR_NBYTES..][..got * zrent_nbytes];
        entries[done * zrent_nbytes..][..src.len()].copy_from_slice(src);
        done += got;
    }

    Ok(ZoneReport {
        nzones: u64::from(geo.nzone),
        zd_nbytes,
        zdext_nbytes,
        zslba,
        zelba: zslba + (nentries as u64 - 1) * geo.nsect,
        nentries,
        extended,
        zrent_nbytes,
        entries,
    })
}

/// Start LBA of a sequential-write zone in `state` with some capacity
/// left.  The first `skip` such zones are passed over, so that callers can
/// spread their work.  `ENXIO` if there is no such zone.
pub fn find_arbitrary(report: &ZoneReport, state: ZoneState, skip: usize)
    -> Result<LbaT>
{
    report.iter()
        .filter(|zd| {
            zd.state() == Some(state) && zd.zt == ZND_TYPE_SEQWR && zd.zcap > 0
        })
        .nth(skip)
        .map(|zd| zd.zslba)
        .ok_or(Error::ENXIO)
}

// LCOV_EXCL_STOP
