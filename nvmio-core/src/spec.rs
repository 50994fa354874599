// vim: tw=80
//! Wire-format records of the NVMe protocol
//!
//! Every record here is bit-exact.  Field offsets and sizes are fixed by the
//! protocol and must never be reordered.

use crate::types::*;
use bitfield::bitfield;
use byteorder::{ByteOrder, LittleEndian};
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use serde_derive::{Deserialize, Serialize};
use std::mem;

/// Size of a submission queue entry
pub const CMD_NBYTES: usize = 64;
/// Size of a completion queue entry
pub const CPL_NBYTES: usize = 16;
/// Size of every identify data structure
pub const IDFY_NBYTES: usize = 4096;
/// Size of a zone descriptor
pub const ZND_DESCR_NBYTES: usize = 64;
/// Size of the header that precedes the descriptors in a zone report
pub const ZND_REPORT_HDR_NBYTES: usize = 64;

pub const ADM_OPC_LOG: u8 = 0x02;
pub const ADM_OPC_IDFY: u8 = 0x06;
pub const ADM_OPC_GFEAT: u8 = 0x0A;

pub const NVM_OPC_FLUSH: u8 = 0x00;
pub const NVM_OPC_WRITE: u8 = 0x01;
pub const NVM_OPC_READ: u8 = 0x02;
pub const ZND_OPC_MGMT_SEND: u8 = 0x79;
pub const ZND_OPC_MGMT_RECV: u8 = 0x7A;
pub const ZND_OPC_APPEND: u8 = 0x7D;
/// Byte-addressed write of the filesystem-like command set
pub const FS_OPC_WRITE: u8 = 0xAC;
/// Byte-addressed read of the filesystem-like command set
pub const FS_OPC_READ: u8 = 0xDC;
pub const FS_OPC_FLUSH: u8 = 0xAD;

pub const IDFY_NS: u8 = 0x00;
pub const IDFY_CTRLR: u8 = 0x01;
pub const IDFY_NS_IOCS: u8 = 0x05;
pub const IDFY_CTRLR_IOCS: u8 = 0x06;

/// Feature identifier of "Number of Queues"
pub const FEAT_NQUEUES: u8 = 0x07;

pub const SCT_GENERIC: u16 = 0x0;
pub const SCT_CMDSPEC: u16 = 0x1;
pub const SCT_MEDIA: u16 = 0x2;
pub const SCT_VENDOR: u16 = 0x7;

pub const SC_INVALID_OPCODE: u16 = 0x01;
pub const SC_INVALID_FIELD: u16 = 0x02;
pub const SC_DATA_XFER_ERROR: u16 = 0x04;
pub const SC_INTERNAL: u16 = 0x06;
pub const SC_LBA_OUT_OF_RANGE: u16 = 0x80;

/// Zone Receive Action: plain report
pub const ZND_RECV_REPORT: u8 = 0x00;
/// Zone Receive Action: report with descriptor extensions
pub const ZND_RECV_EREPORT: u8 = 0x01;
/// Zone Receive Action Specific Field: list every zone
pub const ZND_RECV_SF_ALL: u8 = 0x00;

/// Zone Send Actions
pub const ZND_SEND_CLOSE: u8 = 0x1;
pub const ZND_SEND_FINISH: u8 = 0x2;
pub const ZND_SEND_OPEN: u8 = 0x3;
pub const ZND_SEND_RESET: u8 = 0x4;

/// Sequential-write-required zone type
pub const ZND_TYPE_SEQWR: u8 = 0x2;

/// Command Set Identifier
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, FromPrimitive,
         IntoPrimitive, PartialEq, Serialize)]
#[repr(u8)]
pub enum Csi {
    Nvm = 0x00,
    Zoned = 0x02,
    /// The filesystem-like command set
    Fs = 0x1F,
    #[default]
    Unknown = 0xFF,
}

/// State of a zone, as found in the high nibble of a descriptor's second byte
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ZoneState {
    Empty = 0x1,
    ImplicitlyOpen = 0x2,
    ExplicitlyOpen = 0x3,
    Closed = 0x4,
    ReadOnly = 0xD,
    Full = 0xE,
    Offline = 0xF,
}

/// Zero-based dword count of a transfer of `nbytes`
fn numd(nbytes: usize) -> Result<u32> {
    let nbytes = u32::try_from(nbytes).map_err(|_| Error::EINVAL)?;
    Ok((nbytes >> 2).saturating_sub(1))
}

/// A submission queue entry
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Cmd {
    pub opcode: u8,
    /// Fused operation and PRP/SGL selector
    pub fuse: u8,
    pub cid: u16,
    pub nsid: NsidT,
    pub cdw2: u32,
    pub cdw3: u32,
    pub mptr: u64,
    pub prp1: u64,
    pub prp2: u64,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
}

const _: () = assert!(mem::size_of::<Cmd>() == CMD_NBYTES);

impl Cmd {
    pub fn idfy(cns: u8, cntid: u16, nsid: NsidT, csi: Csi) -> Self {
        Cmd {
            opcode: ADM_OPC_IDFY,
            nsid,
            cdw10: u32::from(cns) | u32::from(cntid) << 16,
            cdw11: u32::from(u8::from(csi)) << 24,
            ..Default::default()
        }
    }

    pub fn gfeat(nsid: NsidT, fid: u8, sel: u8) -> Self {
        Cmd {
            opcode: ADM_OPC_GFEAT,
            nsid,
            cdw10: u32::from(fid) | u32::from(sel & 0x7) << 8,
            ..Default::default()
        }
    }

    /// Get Log Page.  `nbytes` must be a non-zero multiple of four that
    /// fits in the 32-bit dword count.
    pub fn log(nsid: NsidT, lid: u8, lsp: u8, ofst: u64, nbytes: usize)
        -> Result<Self>
    {
        let numd = numd(nbytes)?;
        Ok(Cmd {
            opcode: ADM_OPC_LOG,
            nsid,
            cdw10: u32::from(lid) | u32::from(lsp & 0x7F) << 8 |
                (numd & 0xFFFF) << 16,
            cdw11: numd >> 16,
            cdw12: ofst as u32,
            cdw13: (ofst >> 32) as u32,
            ..Default::default()
        })
    }

    /// A block-addressed read, write, or zone append.  `nlb` is zero-based.
    pub fn nvm(opcode: u8, nsid: NsidT, slba: LbaT, nlb: u16) -> Self {
        let mut cmd = Cmd {
            opcode,
            nsid,
            cdw12: u32::from(nlb),
            ..Default::default()
        };
        cmd.set_slba(slba);
        cmd
    }

    /// Zone Append.  The device picks the LBA and returns it in the
    /// completion's result.
    pub fn append(nsid: NsidT, zslba: LbaT, nlb: u16) -> Self {
        Cmd::nvm(ZND_OPC_APPEND, nsid, zslba, nlb)
    }

    pub fn flush(nsid: NsidT) -> Self {
        Cmd {
            opcode: NVM_OPC_FLUSH,
            nsid,
            ..Default::default()
        }
    }

    /// Zone Management Receive into a buffer of `nbytes`
    pub fn mgmt_recv(nsid: NsidT, slba: LbaT, zra: u8, zrasf: u8,
                     partial: bool, nbytes: usize) -> Result<Self>
    {
        let mut cmd = Cmd {
            opcode: ZND_OPC_MGMT_RECV,
            nsid,
            cdw12: numd(nbytes)?,
            cdw13: u32::from(zra) | u32::from(zrasf) << 8 |
                u32::from(partial) << 16,
            ..Default::default()
        };
        cmd.set_slba(slba);
        Ok(cmd)
    }

    pub fn mgmt_send(nsid: NsidT, slba: LbaT, zsa: u8, select_all: bool)
        -> Self
    {
        let mut cmd = Cmd {
            opcode: ZND_OPC_MGMT_SEND,
            nsid,
            cdw13: u32::from(zsa) | u32::from(select_all) << 8,
            ..Default::default()
        };
        cmd.set_slba(slba);
        cmd
    }

    /// Start LBA of an I/O command; a byte offset for the FS opcodes
    pub fn slba(&self) -> LbaT {
        u64::from(self.cdw10) | u64::from(self.cdw11) << 32
    }

    pub fn set_slba(&mut self, slba: LbaT) {
        self.cdw10 = slba as u32;
        self.cdw11 = (slba >> 32) as u32;
    }

    /// Zero-based number of logical blocks of an I/O command
    pub fn nlb(&self) -> u16 {
        self.cdw12 as u16
    }

    pub fn cns(&self) -> u8 {
        self.cdw10 as u8
    }

    pub fn cntid(&self) -> u16 {
        (self.cdw10 >> 16) as u16
    }

    /// The command set an Identify command asks about
    pub fn idfy_csi(&self) -> Csi {
        Csi::from((self.cdw11 >> 24) as u8)
    }

    pub fn fid(&self) -> u8 {
        self.cdw10 as u8
    }

    /// Zero-based dword count of a Zone Management Receive
    pub fn ndwords(&self) -> u32 {
        self.cdw12
    }

    pub fn zra(&self) -> u8 {
        self.cdw13 as u8
    }

    pub fn zrasf(&self) -> u8 {
        (self.cdw13 >> 8) as u8
    }

    pub fn partial(&self) -> bool {
        self.cdw13 & (1 << 16) != 0
    }

    pub fn zsa(&self) -> u8 {
        self.cdw13 as u8
    }

    pub fn select_all(&self) -> bool {
        self.cdw13 & (1 << 8) != 0
    }

    pub fn to_bytes(&self) -> [u8; CMD_NBYTES] {
        let mut buf = [0u8; CMD_NBYTES];
        buf[0] = self.opcode;
        buf[1] = self.fuse;
        LittleEndian::write_u16(&mut buf[2..4], self.cid);
        LittleEndian::write_u32(&mut buf[4..8], self.nsid);
        LittleEndian::write_u32(&mut buf[8..12], self.cdw2);
        LittleEndian::write_u32(&mut buf[12..16], self.cdw3);
        LittleEndian::write_u64(&mut buf[16..24], self.mptr);
        LittleEndian::write_u64(&mut buf[24..32], self.prp1);
        LittleEndian::write_u64(&mut buf[32..40], self.prp2);
        let cdws = [self.cdw10, self.cdw11, self.cdw12, self.cdw13, self.cdw14,
                    self.cdw15];
        LittleEndian::write_u32_into(&cdws, &mut buf[40..64]);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < CMD_NBYTES {
            return Err(Error::EINVAL);
        }
        let mut cdws = [0u32; 6];
        LittleEndian::read_u32_into(&buf[40..64], &mut cdws);
        Ok(Cmd {
            opcode: buf[0],
            fuse: buf[1],
            cid: LittleEndian::read_u16(&buf[2..4]),
            nsid: LittleEndian::read_u32(&buf[4..8]),
            cdw2: LittleEndian::read_u32(&buf[8..12]),
            cdw3: LittleEndian::read_u32(&buf[12..16]),
            mptr: LittleEndian::read_u64(&buf[16..24]),
            prp1: LittleEndian::read_u64(&buf[24..32]),
            prp2: LittleEndian::read_u64(&buf[32..40]),
            cdw10: cdws[0],
            cdw11: cdws[1],
            cdw12: cdws[2],
            cdw13: cdws[3],
            cdw14: cdws[4],
            cdw15: cdws[5],
        })
    }
}

bitfield! {
    /// Status field of a completion queue entry
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    pub struct Status(u16);
    impl Debug;
    /// Phase tag
    pub p, set_p: 0;
    /// Status Code
    pub u16, sc, set_sc: 8, 1;
    /// Status Code Type
    pub u16, sct, set_sct: 11, 9;
    /// Command Retry Delay
    pub u16, crd, set_crd: 13, 12;
    /// More
    pub m, set_m: 14;
    /// Do Not Retry
    pub dnr, set_dnr: 15;
}

impl Status {
    pub fn new(sct: u16, sc: u16) -> Self {
        let mut status = Status(0);
        status.set_sct(sct);
        status.set_sc(sc);
        status
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Did the command fail?  The phase tag does not count.
    pub fn is_err(&self) -> bool {
        self.sc() != 0 || self.sct() != 0
    }
}

/// A completion queue entry
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct Cpl {
    pub cdw0: u32,
    pub cdw1: u32,
    pub sqhd: u16,
    pub sqid: u16,
    pub cid: u16,
    pub status: Status,
}

const _: () = assert!(mem::size_of::<Cpl>() == CPL_NBYTES);

impl Cpl {
    /// Command-specific result, spanning the first two dwords
    pub fn result(&self) -> u64 {
        u64::from(self.cdw0) | u64::from(self.cdw1) << 32
    }

    pub fn set_result(&mut self, result: u64) {
        self.cdw0 = result as u32;
        self.cdw1 = (result >> 32) as u32;
    }

    pub fn is_err(&self) -> bool {
        self.status.is_err()
    }

    pub fn to_bytes(&self) -> [u8; CPL_NBYTES] {
        let mut buf = [0u8; CPL_NBYTES];
        LittleEndian::write_u32(&mut buf[0..4], self.cdw0);
        LittleEndian::write_u32(&mut buf[4..8], self.cdw1);
        LittleEndian::write_u16(&mut buf[8..10], self.sqhd);
        LittleEndian::write_u16(&mut buf[10..12], self.sqid);
        LittleEndian::write_u16(&mut buf[12..14], self.cid);
        LittleEndian::write_u16(&mut buf[14..16], self.status.0);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < CPL_NBYTES {
            return Err(Error::EINVAL);
        }
        Ok(Cpl {
            cdw0: LittleEndian::read_u32(&buf[0..4]),
            cdw1: LittleEndian::read_u32(&buf[4..8]),
            sqhd: LittleEndian::read_u16(&buf[8..10]),
            sqid: LittleEndian::read_u16(&buf[10..12]),
            cid: LittleEndian::read_u16(&buf[12..14]),
            status: Status(LittleEndian::read_u16(&buf[14..16])),
        })
    }
}

/// A Zone Descriptor, as returned by Zone Management Receive
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ZoneDescr {
    /// Zone Type
    pub zt: u8,
    /// Zone State, raw
    pub zs: u8,
    /// Zone Attributes
    pub za: u8,
    /// Zone Capacity, in LBAs
    pub zcap: u64,
    /// Zone Start LBA
    pub zslba: LbaT,
    /// Write Pointer
    pub wp: LbaT,
}

impl ZoneDescr {
    pub fn from_bytes(buf: &[u8]) -> Self {
        ZoneDescr {
            zt: buf[0] & 0xF,
            zs: buf[1] >> 4,
            za: buf[2],
            zcap: LittleEndian::read_u64(&buf[8..16]),
            zslba: LittleEndian::read_u64(&buf[16..24]),
            wp: LittleEndian::read_u64(&buf[24..32]),
        }
    }

    pub fn state(&self) -> Option<ZoneState> {
        ZoneState::try_from(self.zs).ok()
    }

    pub fn to_bytes(&self) -> [u8; ZND_DESCR_NBYTES] {
        let mut buf = [0u8; ZND_DESCR_NBYTES];
        buf[0] = self.zt & 0xF;
        buf[1] = self.zs << 4;
        buf[2] = self.za;
        LittleEndian::write_u64(&mut buf[8..16], self.zcap);
        LittleEndian::write_u64(&mut buf[16..24], self.zslba);
        LittleEndian::write_u64(&mut buf[24..32], self.wp);
        buf
    }
}

/// Number of zones claimed by a zone report's header
pub fn report_hdr_nzones(hdr: &[u8]) -> u64 {
    LittleEndian::read_u64(&hdr[0..8])
}

pub fn set_report_hdr_nzones(hdr: &mut [u8], nzones: u64) {
    LittleEndian::write_u64(&mut hdr[0..8], nzones)
}

// LCOV_EXCL_STOP
