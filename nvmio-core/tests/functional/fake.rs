// vim: tw=80
//! A scripted zoned namespace, backed by memory

use nvmio_core::{
    be::{
        emu,
        mem,
        AdminMixin,
        Backend,
        DevMixin,
        DevState,
        Mixin,
        Registry,
        SyncMixin,
    },
    cmd::CmdCtx,
    dev::Device,
    ident::{DevType, Ident},
    idfy::{IdfyCtrlr, IdfyNs, Lbaf, Lbafe, ZnsIdfyNs},
    opts::Opts,
    spec::*,
    Error,
    LbaT,
    Result,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
    Mutex,
};

pub const LBA_NBYTES: usize = 512;
/// Zone Invalid Write
const SC_ZONE_INVALID_WRITE: u16 = 0xBC;

#[derive(Clone, Copy, Debug)]
pub struct Layout {
    pub nzone: u64,
    /// Sectors per zone
    pub nsect: u64,
    pub mdts: u8,
    /// Descriptor extension size, in units of 64 bytes
    pub zdes: u8,
    /// Most zones that one report with room for descriptors will admit to.
    /// A header-only report always counts every zone.
    pub report_max: Option<u64>,
    /// Answer no command-set specific identify at all
    pub plain: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            nzone: 300,
            nsect: 16,
            mdts: 1,
            zdes: 0,
            report_max: None,
            plain: false,
        }
    }
}

pub struct Zoned {
    layout: Layout,
    zones: Mutex<Vec<ZoneDescr>>,
    data: Mutex<Vec<u8>>,
    recvs: AtomicUsize,
}

impl DevState for Zoned {}

impl Zoned {
    fn new(layout: Layout) -> Self {
        let zones = (0..layout.nzone).map(|i| ZoneDescr {
            zt: ZND_TYPE_SEQWR,
            zs: ZoneState::Empty.into(),
            za: 0,
            zcap: layout.nsect,
            zslba: i * layout.nsect,
            wp: i * layout.nsect,
        }).collect();
        let nbytes = (layout.nzone * layout.nsect) as usize * LBA_NBYTES;
        Zoned {
            layout,
            zones: Mutex::new(zones),
            data: Mutex::new(vec![0; nbytes]),
            recvs: AtomicUsize::new(0),
        }
    }

    /// Number of Zone Management Receive commands executed so far
    pub fn recvs(&self) -> usize {
        self.recvs.load(Ordering::Relaxed)
    }

    fn zone_of(&self, lba: LbaT) -> Option<usize> {
        let i = lba / self.layout.nsect;
        (i < self.layout.nzone).then_some(i as usize)
    }

    fn fail(ctx: &mut CmdCtx<'_>, sct: u16, sc: u16) -> Result<()> {
        ctx.cpl.status = Status::new(sct, sc);
        Ok(())
    }

    fn recv(&self, ctx: &mut CmdCtx<'_>, buf: &mut [u8]) -> Result<()> {
        self.recvs.fetch_add(1, Ordering::Relaxed);
        let extended = ctx.cmd.zra() == ZND_RECV_EREPORT;
        if extended && self.layout.zdes == 0 {
            return Zoned::fail(ctx, SCT_GENERIC, SC_INVALID_FIELD);
        }
        let Some(first) = self.zone_of(ctx.cmd.slba()) else {
            return Zoned::fail(ctx, SCT_GENERIC, SC_LBA_OUT_OF_RANGE);
        };
        let zrent = if extended {
            ZND_DESCR_NBYTES + usize::from(self.layout.zdes) * 64
        } else {
            ZND_DESCR_NBYTES
        };
        let zones = self.zones.lock().unwrap();
        let fit = buf.len().saturating_sub(ZND_REPORT_HDR_NBYTES) / zrent;
        let mut avail = (zones.len() - first) as u64;
        if let Some(max) = self.layout.report_max.filter(|_| fit > 0) {
            avail = avail.min(max);
        }
        buf.fill(0);
        set_report_hdr_nzones(buf, avail);
        let n = fit.min(avail as usize);
        for (i, zd) in zones[first..].iter().take(n).enumerate() {
            let ofs = ZND_REPORT_HDR_NBYTES + i * zrent;
            buf[ofs..ofs + ZND_DESCR_NBYTES].copy_from_slice(&zd.to_bytes());
            buf[ofs + ZND_DESCR_NBYTES..ofs + zrent].fill((first + i) as u8);
        }
        Ok(())
    }

    fn send(&self, ctx: &mut CmdCtx<'_>) -> Result<()> {
        let mut zones = self.zones.lock().unwrap();
        let targets = if ctx.cmd.select_all() {
            0..zones.len()
        } else {
            match self.zone_of(ctx.cmd.slba()) {
                Some(i) => i..i + 1,
                None => {
                    return Zoned::fail(ctx, SCT_GENERIC, SC_LBA_OUT_OF_RANGE)
                }
            }
        };
        let zsa = ctx.cmd.zsa();
        for zd in zones[targets].iter_mut() {
            match zsa {
                ZND_SEND_RESET => {
                    zd.wp = zd.zslba;
                    zd.zs = ZoneState::Empty.into();
                }
                ZND_SEND_OPEN => zd.zs = ZoneState::ExplicitlyOpen.into(),
                ZND_SEND_CLOSE => zd.zs = ZoneState::Closed.into(),
                ZND_SEND_FINISH => {
                    zd.wp = zd.zslba + zd.zcap;
                    zd.zs = ZoneState::Full.into();
                }
                _ => return Zoned::fail(ctx, SCT_GENERIC, SC_INVALID_FIELD),
            }
        }
        Ok(())
    }

    fn write(&self, ctx: &mut CmdCtx<'_>, buf: &[u8]) -> Result<()> {
        let nlb = u64::from(ctx.cmd.nlb()) + 1;
        let slba = ctx.cmd.slba();
        let append = ctx.cmd.opcode == ZND_OPC_APPEND;
        let Some(i) = self.zone_of(slba) else {
            return Zoned::fail(ctx, SCT_GENERIC, SC_LBA_OUT_OF_RANGE);
        };
        let mut zones = self.zones.lock().unwrap();
        let zd = &mut zones[i];
        if append && slba != zd.zslba {
            return Zoned::fail(ctx, SCT_GENERIC, SC_INVALID_FIELD);
        }
        let lba = if append { zd.wp } else { slba };
        if lba != zd.wp || zd.wp + nlb > zd.zslba + zd.zcap {
            return Zoned::fail(ctx, SCT_CMDSPEC, SC_ZONE_INVALID_WRITE);
        }
        let ofs = lba as usize * LBA_NBYTES;
        self.data.lock().unwrap()[ofs..ofs + buf.len()].copy_from_slice(buf);
        zd.wp += nlb;
        let state = if zd.wp == zd.zslba + zd.zcap {
            ZoneState::Full
        } else {
            ZoneState::ImplicitlyOpen
        };
        zd.zs = state.into();
        if append {
            ctx.cpl.set_result(lba);
        }
        Ok(())
    }

    fn read(&self, ctx: &mut CmdCtx<'_>, buf: &mut [u8]) -> Result<()> {
        let ofs = ctx.cmd.slba() as usize * LBA_NBYTES;
        let data = self.data.lock().unwrap();
        match data.get(ofs..ofs + buf.len()) {
            Some(src) => buf.copy_from_slice(src),
            None => {
                return Zoned::fail(ctx, SCT_GENERIC, SC_LBA_OUT_OF_RANGE)
            }
        }
        Ok(())
    }
}

struct FakeDev(Layout);

impl DevMixin for FakeDev {
    fn name(&self) -> &'static str {
        "zoned"
    }

    fn dev_open(&self, ident: &mut Ident, _opts: &Opts)
        -> Result<Box<dyn DevState>>
    {
        ident.dtype = DevType::NvmeNamespace;
        ident.csi = if self.0.plain { Csi::Nvm } else { Csi::Zoned };
        ident.nsid = 1;
        Ok(Box::new(Zoned::new(self.0)))
    }
}

struct FakeAdmin;

impl AdminMixin for FakeAdmin {
    fn name(&self) -> &'static str {
        "zoned"
    }

    fn cmd_admin(&self, ctx: &mut CmdCtx<'_>, data: Option<&mut [u8]>,
                 _meta: Option<&mut [u8]>) -> Result<()>
    {
        let layout = ctx.dev().state::<Zoned>()?.layout;
        if ctx.cmd.opcode != ADM_OPC_IDFY {
            return Err(Error::ENOSYS);
        }
        let buf = data.ok_or(Error::EINVAL)?;
        buf.fill(0);
        match (ctx.cmd.cns(), ctx.cmd.idfy_csi()) {
            (IDFY_CTRLR, _) => IdfyCtrlr(&mut *buf).set_mdts(layout.mdts),
            (IDFY_NS, _) => {
                let mut ns = IdfyNs(&mut *buf);
                let nlbas = layout.nzone * layout.nsect;
                ns.set_sizes(nlbas, nlbas, nlbas);
                ns.set_flbas(0, false);
                ns.set_lbaf(0, Lbaf { ms: 0, ds: 9, rp: 0 });
            }
            (IDFY_CTRLR_IOCS, Csi::Zoned) if !layout.plain => (),
            (IDFY_NS_IOCS, Csi::Zoned) if !layout.plain => {
                let lbafe = Lbafe { zsze: layout.nsect, zdes: layout.zdes };
                ZnsIdfyNs(&mut *buf).set_lbafe(0, lbafe);
            }
            _ => return Zoned::fail(ctx, SCT_GENERIC, SC_INVALID_FIELD),
        }
        Ok(())
    }
}

struct FakeSync;

impl SyncMixin for FakeSync {
    fn name(&self) -> &'static str {
        "zoned"
    }

    fn cmd_io(&self, ctx: &mut CmdCtx<'_>, data: Option<&mut [u8]>,
              _meta: Option<&mut [u8]>) -> Result<()>
    {
        let zoned = ctx.dev().state::<Zoned>()?;
        match (ctx.cmd.opcode, data) {
            (ZND_OPC_MGMT_RECV, Some(buf)) => zoned.recv(ctx, buf),
            (ZND_OPC_MGMT_SEND, _) => zoned.send(ctx),
            (NVM_OPC_WRITE | ZND_OPC_APPEND, Some(buf)) => {
                zoned.write(ctx, buf)
            }
            (NVM_OPC_READ, Some(buf)) => zoned.read(ctx, buf),
            (NVM_OPC_FLUSH, _) => Ok(()),
            (ZND_OPC_MGMT_RECV | NVM_OPC_WRITE | ZND_OPC_APPEND | NVM_OPC_READ,
             None) => Err(Error::EINVAL),
            _ => Err(Error::ENOSYS),
        }
    }
}

pub fn backend(layout: Layout) -> Backend {
    Backend {
        name: "zoned",
        schemes: &["fake"],
        enabled: true,
        mixins: vec![
            Mixin::Mem(Arc::new(mem::Posix)),
            Mixin::Async(Arc::new(emu::Emu)),
            Mixin::Sync(Arc::new(FakeSync)),
            Mixin::Admin(Arc::new(FakeAdmin)),
            Mixin::Dev(Arc::new(FakeDev(layout))),
        ],
    }
}

/// Open a fake zoned device through a registry that knows only it
pub fn open(layout: Layout) -> Device {
    let mut registry = Registry::new();
    registry.push(backend(layout));
    Device::open_with(&registry, "fake:zns0", &Opts::default()).unwrap()
}
