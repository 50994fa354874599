// vim: tw=80
use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process::exit,
};

use clap::{crate_version, Args, Parser};
use nvmio_core::{
    be::Registry,
    cmd::CmdCtx,
    dev::Device,
    geo::Geo,
    ident::Ident,
    nvm,
    opts::Opts,
    spec::*,
    znd,
    Error,
    Result,
};
use serde_derive::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Options shared by every subcommand that opens a device
#[derive(Args, Clone, Debug, Default)]
struct DevArgs {
    /// YAML file of device options, applied before the flags below
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// Only try the named backend
    #[clap(long, global = true)]
    be:     Option<String>,
    /// Synchronous command interface
    #[clap(long, global = true)]
    sync:   Option<String>,
    /// Asynchronous command interface
    #[clap(long = "async", global = true)]
    async_: Option<String>,
    /// Admin command interface
    #[clap(long, global = true)]
    admin:  Option<String>,
    /// Buffer allocator
    #[clap(long, global = true)]
    mem:    Option<String>,
    /// Namespace to use, if the URI names a controller
    #[clap(long, global = true)]
    nsid:   Option<u32>,
}

impl DevArgs {
    fn opts(&self) -> Result<Opts> {
        let mut opts = match &self.config {
            Some(path) => {
                let yaml = fs::read_to_string(path)?;
                Opts::from_yaml(&yaml)?
            }
            None => Opts::default(),
        };
        if let Some(be) = &self.be {
            opts.be = Some(be.clone());
        }
        if let Some(sync) = &self.sync {
            opts.sync = Some(sync.clone());
        }
        if let Some(async_) = &self.async_ {
            opts.async_ = Some(async_.clone());
        }
        if let Some(admin) = &self.admin {
            opts.admin = Some(admin.clone());
        }
        if let Some(mem) = &self.mem {
            opts.mem = Some(mem.clone());
        }
        if let Some(nsid) = self.nsid {
            opts.nsid = nsid;
        }
        Ok(opts)
    }

    fn open(&self, uri: &str) -> Result<Device> {
        let opts = self.opts()?;
        debug!(?opts, "opening {uri}");
        Device::open(uri, &opts)
    }
}

/// Fail with EIO if the device rejected the last command
fn check_cpl(ctx: &CmdCtx<'_>) -> Result<()> {
    if ctx.cpl.is_err() {
        eprintln!("Command failed: sct={:#x} sc={:#x}",
                  ctx.cpl.status.sct(), ctx.cpl.status.sc());
        Err(Error::EIO)
    } else {
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
/// List devices visible to the available backends
struct Enumerate {
    /// Restrict the search to this system
    #[clap(long)]
    uri: Option<String>,
}

impl Enumerate {
    fn main(self, args: &DevArgs) -> Result<()> {
        let opts = args.opts()?;
        let mut table = tabular::Table::new("{:<}  {:<}  {:>}  {:<}");
        table.add_row(tabular::Row::new()
            .with_cell("URI")
            .with_cell("TYPE")
            .with_cell("NSID")
            .with_cell("CSI"));
        Registry::global().enumerate(self.uri.as_deref(), &opts, |ident| {
            let mut row = tabular::Row::new();
            row.add_cell(ident);
            row.add_cell(ident.dtype);
            row.add_cell(ident.nsid);
            row.add_cell(format!("{:?}", ident.csi));
            table.add_row(row);
        })?;
        print!("{table}");
        Ok(())
    }
}

#[derive(Serialize)]
struct Info<'a> {
    backend: &'static str,
    ident:   &'a Ident,
    opts:    &'a Opts,
    geo:     &'a Geo,
}

#[derive(Parser, Clone, Debug)]
/// Print a device's identity, options and geometry as YAML
struct InfoCmd {
    #[clap(required(true))]
    uri: String,
}

impl InfoCmd {
    fn main(self, args: &DevArgs) -> Result<()> {
        let dev = args.open(&self.uri)?;
        let info = Info {
            backend: dev.be_name(),
            ident: dev.ident(),
            opts: dev.opts(),
            geo: dev.geo()?,
        };
        let yaml = serde_yaml_ng::to_string(&info).map_err(|e| {
            eprintln!("{e}");
            Error::EINVAL
        })?;
        print!("{yaml}");
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
/// Print the controller and namespace identify data
struct Idfy {
    #[clap(required(true))]
    uri: String,
    /// Dump the raw identify pages
    #[clap(long)]
    raw: bool,
}

impl Idfy {
    fn main(self, args: &DevArgs) -> Result<()> {
        let dev = args.open(&self.uri)?;
        let ctrlr = dev.ctrlr()?;
        if self.raw {
            println!("Identify Controller:");
            hexdump::hexdump(ctrlr.0);
            println!("Identify Namespace:");
            hexdump::hexdump(dev.ns()?.0);
            return Ok(());
        }
        let ns = dev.ns()?;
        let mut table = tabular::Table::new("{:<}  {:<}");
        let fields: [(&str, String); 9] = [
            ("vid", format!("{:#06x}", ctrlr.vid())),
            ("sn", ctrlr.sn()),
            ("mn", ctrlr.mn()),
            ("fr", ctrlr.fr()),
            ("mdts", ctrlr.mdts().to_string()),
            ("cntlid", ctrlr.cntlid().to_string()),
            ("ver", format!("{:#010x}", ctrlr.ver())),
            ("subnqn", ctrlr.subnqn()),
            ("nsze", ns.nsze().to_string()),
        ];
        for (name, value) in fields {
            table.add_row(tabular::Row::new().with_cell(name).with_cell(value));
        }
        print!("{table}");
        Ok(())
    }
}

/// Size of a transfer of `nlb + 1` blocks
fn xfer_nbytes(dev: &Device, nlb: u16) -> Result<usize> {
    let geo = dev.geo()?;
    Ok((usize::from(nlb) + 1) * geo.lba_nbytes as usize)
}

#[derive(Parser, Clone, Debug)]
/// Read logical blocks
struct Read {
    #[clap(required(true))]
    uri:    String,
    /// Starting LBA
    #[clap(long, default_value_t = 0)]
    slba:   u64,
    /// Number of blocks, zero-based
    #[clap(long, default_value_t = 0)]
    nlb:    u16,
    /// Write the data here instead of dumping it to stdout
    #[clap(short, long)]
    output: Option<PathBuf>,
}

impl Read {
    fn main(self, args: &DevArgs) -> Result<()> {
        let dev = args.open(&self.uri)?;
        let mut buf = dev.buf_alloc(xfer_nbytes(&dev, self.nlb)?)?;
        let mut ctx = CmdCtx::from_dev(&dev);
        nvm::read(&mut ctx, dev.nsid(), self.slba, self.nlb,
                  Some(&mut buf[..]), None)?;
        check_cpl(&ctx)?;
        match self.output {
            Some(path) => fs::write(path, &buf[..])?,
            None => hexdump::hexdump(&buf[..]),
        }
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
/// Write logical blocks
struct WriteCmd {
    #[clap(required(true))]
    uri:   String,
    /// Starting LBA
    #[clap(long, default_value_t = 0)]
    slba:  u64,
    /// Number of blocks, zero-based
    #[clap(long, default_value_t = 0)]
    nlb:   u16,
    /// Data to write.  It is zero-padded or truncated to the transfer size.
    /// Zeros are written if it is omitted.
    #[clap(short, long)]
    input: Option<PathBuf>,
}

impl WriteCmd {
    fn main(self, args: &DevArgs) -> Result<()> {
        let dev = args.open(&self.uri)?;
        let nbytes = xfer_nbytes(&dev, self.nlb)?;
        let mut buf = dev.buf_alloc(nbytes)?;
        buf.fill(0);
        if let Some(path) = self.input {
            let data = fs::read(path)?;
            let n = data.len().min(nbytes);
            buf[..n].copy_from_slice(&data[..n]);
        }
        let mut ctx = CmdCtx::from_dev(&dev);
        nvm::write(&mut ctx, dev.nsid(), self.slba, self.nlb,
                   Some(&mut buf[..]), None)?;
        check_cpl(&ctx)
    }
}

fn zone_type(zt: u8) -> String {
    match zt {
        ZND_TYPE_SEQWR => "SEQWR".to_owned(),
        _ => format!("{zt:#x}"),
    }
}

#[derive(Parser, Clone, Debug)]
/// Print the zones of a zoned namespace
struct Report {
    #[clap(required(true))]
    uri:   String,
    /// First LBA of interest.  It is rounded down to its zone.
    #[clap(long, default_value_t = 0)]
    slba:  u64,
    /// Most zones to report.  Zero means all of them.
    #[clap(long, default_value_t = 0)]
    limit: usize,
}

impl Report {
    fn main(self, args: &DevArgs) -> Result<()> {
        let dev = args.open(&self.uri)?;
        let report = znd::report_from_dev(&dev, self.slba, self.limit, false)?;
        let mut table = tabular::Table::new("{:>}  {:>}  {:>}  {:<}  {:<}");
        table.add_row(tabular::Row::new()
            .with_cell("ZSLBA")
            .with_cell("WP")
            .with_cell("ZCAP")
            .with_cell("STATE")
            .with_cell("TYPE"));
        for zd in report.iter() {
            let state = match zd.state() {
                Some(state) => format!("{state:?}"),
                None => format!("{:#x}", zd.zs),
            };
            table.add_row(tabular::Row::new()
                .with_cell(format!("{:#x}", zd.zslba))
                .with_cell(format!("{:#x}", zd.wp))
                .with_cell(zd.zcap)
                .with_cell(state)
                .with_cell(zone_type(zd.zt)));
        }
        print!("{table}");
        io::stdout().flush()?;
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
enum SubCommand {
    #[clap(name = "enum")]
    Enumerate(Enumerate),
    #[clap(name = "info")]
    Info(InfoCmd),
    Idfy(Idfy),
    Read(Read),
    #[clap(name = "write")]
    Write(WriteCmd),
    Report(Report),
}

#[derive(Parser, Clone, Debug)]
#[clap(version = crate_version!())]
/// Inspect and exercise storage devices
struct Cli {
    #[clap(flatten)]
    dev: DevArgs,
    #[clap(subcommand)]
    cmd: SubCommand,
}

fn main() {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let cli: Cli = Cli::parse();
    let r = match cli.cmd {
        SubCommand::Enumerate(enumerate) => enumerate.main(&cli.dev),
        SubCommand::Info(info) => info.main(&cli.dev),
        SubCommand::Idfy(idfy) => idfy.main(&cli.dev),
        SubCommand::Read(read) => read.main(&cli.dev),
        SubCommand::Write(write) => write.main(&cli.dev),
        SubCommand::Report(report) => report.main(&cli.dev),
    };
    if let Err(e) = r {
        eprintln!("Error: {e}");
        exit(i32::from(e));
    }
}

// LCOV_EXCL_STOP
