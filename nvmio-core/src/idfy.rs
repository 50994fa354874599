// vim: tw=80
//! Views of Identify data structures
//!
//! Each view wraps a 4 KiB identify buffer and reads (or, for backends that
//! emulate Identify, writes) the fields at their fixed offsets.

use crate::{
    spec::{Csi, IDFY_NBYTES},
    util::ascii_field,
};
use byteorder::{ByteOrder, LittleEndian};

/// Magic values that mark the filesystem-like command set's identify data
pub const FS_AC: u8 = 0xAC;
pub const FS_DC: u8 = 0xDC;

/// Number of LBA formats in an Identify Namespace structure
pub const NLBAF: usize = 16;

macro_rules! view {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug)]
        pub struct $name<B>(pub B);

        impl<B: AsRef<[u8]>> $name<B> {
            fn bytes(&self) -> &[u8] {
                &self.0.as_ref()[..IDFY_NBYTES]
            }

            #[allow(dead_code)]
            fn u16_at(&self, ofs: usize) -> u16 {
                LittleEndian::read_u16(&self.bytes()[ofs..])
            }

            #[allow(dead_code)]
            fn u32_at(&self, ofs: usize) -> u32 {
                LittleEndian::read_u32(&self.bytes()[ofs..])
            }

            #[allow(dead_code)]
            fn u64_at(&self, ofs: usize) -> u64 {
                LittleEndian::read_u64(&self.bytes()[ofs..])
            }
        }

        impl<B: AsMut<[u8]>> $name<B> {
            fn bytes_mut(&mut self) -> &mut [u8] {
                &mut self.0.as_mut()[..IDFY_NBYTES]
            }

            #[allow(dead_code)]
            fn set_u32_at(&mut self, ofs: usize, v: u32) {
                LittleEndian::write_u32(&mut self.bytes_mut()[ofs..], v)
            }

            #[allow(dead_code)]
            fn set_u64_at(&mut self, ofs: usize, v: u64) {
                LittleEndian::write_u64(&mut self.bytes_mut()[ofs..], v)
            }
        }
    }
}

view!(
    /// Identify Controller
    IdfyCtrlr
);

impl<B: AsRef<[u8]>> IdfyCtrlr<B> {
    pub fn vid(&self) -> u16 {
        self.u16_at(0)
    }

    pub fn sn(&self) -> String {
        ascii_field(&self.bytes()[4..24])
    }

    pub fn mn(&self) -> String {
        ascii_field(&self.bytes()[24..64])
    }

    pub fn fr(&self) -> String {
        ascii_field(&self.bytes()[64..72])
    }

    /// Maximum Data Transfer Size, as a power of two of the minimum page
    /// size.  Zero means unbounded.
    pub fn mdts(&self) -> u8 {
        self.bytes()[77]
    }

    pub fn cntlid(&self) -> u16 {
        self.u16_at(78)
    }

    pub fn ver(&self) -> u32 {
        self.u32_at(80)
    }

    pub fn subnqn(&self) -> String {
        ascii_field(&self.bytes()[768..1024])
    }
}

impl<B: AsMut<[u8]>> IdfyCtrlr<B> {
    pub fn set_mdts(&mut self, mdts: u8) {
        self.bytes_mut()[77] = mdts;
    }

    pub fn set_mn(&mut self, mn: &str) {
        let field = &mut self.bytes_mut()[24..64];
        field.fill(b' ');
        let n = mn.len().min(field.len());
        field[..n].copy_from_slice(&mn.as_bytes()[..n]);
    }

    pub fn set_subnqn(&mut self, nqn: &str) {
        let field = &mut self.bytes_mut()[768..1024];
        field.fill(0);
        let n = nqn.len().min(field.len());
        field[..n].copy_from_slice(&nqn.as_bytes()[..n]);
    }
}

/// One LBA Format of an Identify Namespace structure
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Lbaf {
    /// Metadata bytes per LBA
    pub ms: u16,
    /// LBA data size, as a power of two
    pub ds: u8,
    /// Relative performance
    pub rp: u8,
}

view!(
    /// Identify Namespace, for the NVM command set
    IdfyNs
);

impl<B: AsRef<[u8]>> IdfyNs<B> {
    /// Namespace size, in LBAs
    pub fn nsze(&self) -> u64 {
        self.u64_at(0)
    }

    pub fn ncap(&self) -> u64 {
        self.u64_at(8)
    }

    pub fn nuse(&self) -> u64 {
        self.u64_at(16)
    }

    /// Zero-based number of LBA formats
    pub fn nlbaf(&self) -> u8 {
        self.bytes()[25]
    }

    /// Index of the LBA format in use
    pub fn flbas_format(&self) -> usize {
        usize::from(self.bytes()[26] & 0xF)
    }

    /// Is metadata transferred at the end of each LBA's data?
    pub fn flbas_extended(&self) -> bool {
        self.bytes()[26] & 0x10 != 0
    }

    pub fn lbaf(&self, i: usize) -> Lbaf {
        let ofs = 128 + 4 * i;
        let b = self.bytes();
        Lbaf {
            ms: LittleEndian::read_u16(&b[ofs..]),
            ds: b[ofs + 2],
            rp: b[ofs + 3] & 0x3,
        }
    }

    /// The LBA format in use
    pub fn active_lbaf(&self) -> Lbaf {
        self.lbaf(self.flbas_format())
    }
}

impl<B: AsMut<[u8]>> IdfyNs<B> {
    pub fn set_sizes(&mut self, nsze: u64, ncap: u64, nuse: u64) {
        self.set_u64_at(0, nsze);
        self.set_u64_at(8, ncap);
        self.set_u64_at(16, nuse);
    }

    pub fn set_flbas(&mut self, format: u8, extended: bool) {
        self.bytes_mut()[26] = (format & 0xF) | (u8::from(extended) << 4);
    }

    pub fn set_lbaf(&mut self, i: usize, lbaf: Lbaf) {
        let ofs = 128 + 4 * i;
        let b = self.bytes_mut();
        LittleEndian::write_u16(&mut b[ofs..], lbaf.ms);
        b[ofs + 2] = lbaf.ds;
        b[ofs + 3] = lbaf.rp & 0x3;
    }
}

/// One extended LBA format of the zoned command set
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Lbafe {
    /// Zone size, in LBAs
    pub zsze: u64,
    /// Zone descriptor extension size, in units of 64 bytes
    pub zdes: u8,
}

view!(
    /// Identify Namespace, for the Zoned Namespace command set
    ZnsIdfyNs
);

impl<B: AsRef<[u8]>> ZnsIdfyNs<B> {
    /// Maximum Active Resources, zero-based
    pub fn mar(&self) -> u32 {
        self.u32_at(4)
    }

    /// Maximum Open Resources, zero-based
    pub fn mor(&self) -> u32 {
        self.u32_at(8)
    }

    pub fn lbafe(&self, i: usize) -> Lbafe {
        let ofs = 2816 + 16 * i;
        Lbafe {
            zsze: self.u64_at(ofs),
            zdes: self.bytes()[ofs + 8],
        }
    }
}

impl<B: AsMut<[u8]>> ZnsIdfyNs<B> {
    pub fn set_lbafe(&mut self, i: usize, lbafe: Lbafe) {
        let ofs = 2816 + 16 * i;
        self.set_u64_at(ofs, lbafe.zsze);
        self.bytes_mut()[ofs + 8] = lbafe.zdes;
    }
}

view!(
    /// Identify Controller, for the filesystem-like command set
    FsIdfyCtrlr
);

impl<B: AsRef<[u8]>> FsIdfyCtrlr<B> {
    pub fn direct(&self) -> bool {
        self.bytes()[520] & 1 != 0
    }

    pub fn file_data_size(&self) -> u64 {
        self.u64_at(528)
    }

    /// I/O sizes, as (min, max, opt)
    pub fn iosizes(&self) -> (u32, u32, u32) {
        (self.u32_at(568), self.u32_at(572), self.u32_at(576))
    }

    /// Does the structure carry the filesystem-like command set's magic?
    pub fn is_valid(&self) -> bool {
        self.bytes()[4089] == FS_AC && self.bytes()[4090] == FS_DC
    }
}

impl<B: AsMut<[u8]>> FsIdfyCtrlr<B> {
    /// Fill in a controller that does direct I/O in sizes up to `max`.
    pub fn emulate(&mut self, max: u32) {
        self.bytes_mut()[520] = 1;
        self.set_u64_at(528, 1);
        self.set_u32_at(568, 1);
        self.set_u32_at(572, max);
        self.set_u32_at(576, 64 * 1024);
        self.bytes_mut()[4089] = FS_AC;
        self.bytes_mut()[4090] = FS_DC;
    }
}

view!(
    /// Identify Namespace, for the filesystem-like command set
    FsIdfyNs
);

impl<B: AsRef<[u8]>> FsIdfyNs<B> {
    /// Size of the underlying filesystem, in bytes
    pub fn nsze(&self) -> u64 {
        self.u64_at(0)
    }

    pub fn ncap(&self) -> u64 {
        self.u64_at(8)
    }

    /// Current size of the file, in bytes
    pub fn nuse(&self) -> u64 {
        self.u64_at(16)
    }

    pub fn is_valid(&self) -> bool {
        self.nsze() != 0 && self.ncap() != 0 &&
            self.bytes()[4094] == FS_AC && self.bytes()[4095] == FS_DC
    }
}

impl<B: AsMut<[u8]>> FsIdfyNs<B> {
    /// Fill in a namespace backed by `nbytes` of storage.
    pub fn emulate(&mut self, nbytes: u64) {
        self.set_u64_at(0, nbytes);
        self.set_u64_at(8, nbytes);
        self.set_u64_at(16, nbytes);
        self.bytes_mut()[4094] = FS_AC;
        self.bytes_mut()[4095] = FS_DC;
    }
}

/// The result of identifying a device, cached by the device handle.
#[derive(Clone, Debug)]
pub struct Idfy {
    pub(crate) ctrlr: Vec<u8>,
    pub(crate) ns: Vec<u8>,
    /// Command-set specific controller data.  All zeros unless the command
    /// set is zoned or filesystem-like.
    pub(crate) ctrlr_css: Vec<u8>,
    /// Command-set specific namespace data
    pub(crate) ns_css: Vec<u8>,
    pub(crate) csi: Csi,
}

impl Idfy {
    pub(crate) fn new() -> Self {
        Idfy {
            ctrlr: vec![0; IDFY_NBYTES],
            ns: vec![0; IDFY_NBYTES],
            ctrlr_css: vec![0; IDFY_NBYTES],
            ns_css: vec![0; IDFY_NBYTES],
            csi: Csi::Nvm,
        }
    }

    /// The command set the probe settled on
    pub fn csi(&self) -> Csi {
        self.csi
    }

    pub fn ctrlr(&self) -> IdfyCtrlr<&[u8]> {
        IdfyCtrlr(&self.ctrlr)
    }

    pub fn ns(&self) -> IdfyNs<&[u8]> {
        IdfyNs(&self.ns)
    }

    pub fn ctrlr_css(&self) -> &[u8] {
        &self.ctrlr_css
    }

    pub fn ns_css(&self) -> &[u8] {
        &self.ns_css
    }

    pub fn zns(&self) -> ZnsIdfyNs<&[u8]> {
        ZnsIdfyNs(&self.ns_css)
    }

    pub fn fs_ns(&self) -> FsIdfyNs<&[u8]> {
        FsIdfyNs(&self.ns_css)
    }

    pub fn subnqn(&self) -> String {
        self.ctrlr().subnqn()
    }
}

// LCOV_EXCL_STOP
