// vim: tw=80
//! Device geometry: the shape of a device's addressable space

use crate::{
    dev::Device,
    ident::DevType,
    idfy::Idfy,
    spec::{Csi, ZND_RECV_SF_ALL},
    types::*,
    util::div_roundup,
    znd,
};
use serde_derive::Serialize;
use tracing::debug;

/// Transfer limit for controllers that don't state one
pub const MDTS_DEFAULT: u64 = 1 << 20;

/// Most segments the Linux kernel will put in one request
const LINUX_MAX_SEGMENTS: u64 = 127;

/// Sector size that filesystem files are addressed with
const FS_LBA_NBYTES: u32 = 512;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum GeoType {
    #[default]
    Unknown,
    Conventional,
    Zoned,
    /// Key-value.  Never derived by any built-in backend.
    Kv,
}

/// Derived description of a device's addressable space.  Immutable once
/// derived.
///
/// `tbytes == npugrp * npunit * nzone * nsect * nbytes` and
/// `1 << ssw == nbytes` always hold.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Geo {
    pub geo_type: GeoType,
    /// Parallel unit groups
    pub npugrp: u32,
    /// Parallel units per group
    pub npunit: u32,
    /// Zones per parallel unit
    pub nzone: u32,
    /// Sectors per zone
    pub nsect: u64,
    /// Data bytes per sector
    pub nbytes: u32,
    /// Out-of-band (metadata) bytes per sector
    pub nbytes_oob: u32,
    /// Total data bytes
    pub tbytes: u64,
    /// Largest data transfer of a single command, in bytes
    pub mdts_nbytes: u64,
    /// Bytes transferred per LBA, including metadata if `lba_extended`
    pub lba_nbytes: u32,
    /// Is metadata interleaved with data?
    pub lba_extended: bool,
    /// Sector shift width: log2(nbytes)
    pub ssw: u32,
}

impl Geo {
    fn new(geo_type: GeoType, nzone: u32, nsect: u64, nbytes: u32,
           nbytes_oob: u32, extended: bool) -> Self
    {
        let lba_extended = extended && nbytes_oob != 0;
        let lba_nbytes = if lba_extended {
            nbytes + nbytes_oob
        } else {
            nbytes
        };
        Geo {
            geo_type,
            npugrp: 1,
            npunit: 1,
            nzone,
            nsect,
            nbytes,
            nbytes_oob,
            tbytes: u64::from(nzone) * nsect * u64::from(nbytes),
            mdts_nbytes: MDTS_DEFAULT,
            lba_nbytes,
            lba_extended,
            ssw: nbytes.trailing_zeros(),
        }
    }

    /// A single-zone geometry of `nsect` sectors
    pub fn conventional(nsect: u64, nbytes: u32, nbytes_oob: u32,
                        extended: bool) -> Self
    {
        Geo::new(GeoType::Conventional, 1, nsect, nbytes, nbytes_oob, extended)
    }

    /// `nzone` zones of `nsect` sectors each
    pub fn zoned(nzone: u32, nsect: u64, nbytes: u32, nbytes_oob: u32,
                 extended: bool) -> Self
    {
        Geo::new(GeoType::Zoned, nzone, nsect, nbytes, nbytes_oob, extended)
    }

    /// Number of addressable LBAs
    pub fn nlbas(&self) -> u64 {
        self.tbytes >> self.ssw
    }

    /// Largest number of LBAs that one command may transfer
    pub fn mdts_nlbas(&self) -> u64 {
        self.mdts_nbytes / u64::from(self.lba_nbytes)
    }
}

/// Sector size of an LBA format's `ds` field, rejecting nonsense
fn lba_nbytes(ds: u8) -> Result<u32> {
    if (9..32).contains(&ds) {
        Ok(1 << ds)
    } else {
        debug!(ds, "invalid LBA data size");
        Err(Error::EINVAL)
    }
}

fn conventional(idfy: &Idfy) -> Result<Geo> {
    let ns = idfy.ns();
    let lbaf = ns.active_lbaf();
    let nbytes = lba_nbytes(lbaf.ds)?;
    Ok(Geo::conventional(ns.nsze(), nbytes, u32::from(lbaf.ms),
                         ns.flbas_extended()))
}

fn zoned(dev: &Device, idfy: &Idfy) -> Result<Geo> {
    let ns = idfy.ns();
    let zns = idfy.zns();
    if zns.lbafe(0).zsze == 0 {
        debug!("zoned namespace without a zone size");
        return Err(Error::EINVAL);
    }
    let lbaf = ns.active_lbaf();
    let nbytes = lba_nbytes(lbaf.ds)?;
    let nzone = znd::stat(dev, ZND_RECV_SF_ALL)?;
    let nzone = u32::try_from(nzone).map_err(|_| Error::ERANGE)?;
    let nsect = zns.lbafe(ns.flbas_format()).zsze;
    Ok(Geo::zoned(nzone, nsect, nbytes, u32::from(lbaf.ms),
                  ns.flbas_extended()))
}

/// Byte-granular files are addressed as 512-byte sectors, rounding the file
/// size up.
fn fs(idfy: &Idfy) -> Geo {
    let nuse = idfy.fs_ns().nuse();
    let nsect = div_roundup(nuse, u64::from(FS_LBA_NBYTES));
    Geo::conventional(nsect, FS_LBA_NBYTES, 0, false)
}

/// Derive a device's geometry from its identify data.
pub(crate) fn derive(dev: &Device, idfy: &Idfy) -> Result<Geo> {
    let dtype = dev.ident().dtype;
    let mut geo = match dtype {
        DevType::FsFile => {
            // Files have no controller to ask for a transfer limit
            return Ok(fs(idfy));
        }
        DevType::Ramdisk | DevType::BlockDevice | DevType::NvmeNamespace => {
            match idfy.csi() {
                Csi::Nvm | Csi::Fs => conventional(idfy)?,
                Csi::Zoned => zoned(dev, idfy)?,
                Csi::Unknown => {
                    debug!(?dtype, "unhandled command set");
                    return Err(Error::ENOSYS);
                }
            }
        }
        DevType::NvmeController | DevType::Unknown => {
            debug!(?dtype, "no geometry for device type");
            return Err(Error::ENOSYS);
        }
    };

    let mdts = idfy.ctrlr().mdts();
    geo.mdts_nbytes = match mdts {
        0 => MDTS_DEFAULT,
        _ => 1u64.checked_shl(u32::from(mdts) + 12).unwrap_or(u64::MAX),
    };
    if dev.be_name() == "linux" &&
        geo.mdts_nlbas() > LINUX_MAX_SEGMENTS
    {
        geo.mdts_nbytes = u64::from(geo.lba_nbytes) * LINUX_MAX_SEGMENTS;
        debug!(mdts_nbytes = geo.mdts_nbytes, "capped to segment limit");
    }
    Ok(geo)
}

// LCOV_EXCL_STOP
