// vim: tw=80
//! Device identifiers, as parsed from URIs

use crate::{spec::Csi, types::*};
use serde_derive::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// Scheme assumed for a bare filesystem path
pub const DEFAULT_SCHEME: &str = "file";

/// Longest accepted target, in bytes
pub const TARGET_MAXLEN: usize = 255;

/// Separates the target from the options, and the options from each other
pub const OPTS_SEP: char = '?';

/// What kind of thing a backend found behind an identifier
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum DevType {
    #[default]
    Unknown,
    NvmeNamespace,
    NvmeController,
    BlockDevice,
    FsFile,
    Ramdisk,
}

impl Display for DevType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            DevType::Unknown => "unknown",
            DevType::NvmeNamespace => "nvme-namespace",
            DevType::NvmeController => "nvme-controller",
            DevType::BlockDevice => "block-device",
            DevType::FsFile => "fs-file",
            DevType::Ramdisk => "ramdisk",
        };
        f.write_str(s)
    }
}

/// A parsed device URI: `<scheme>:<target>[?<opt>=<val>[?<opt>=<val>...]]`
///
/// The `dtype`, `nsid` and `csi` fields are not part of the URI.  The
/// backend that opens the device fills them in.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Ident {
    scheme: String,
    target: String,
    opts: Option<String>,
    pub dtype: DevType,
    pub nsid: NsidT,
    pub csi: Csi,
}

impl Ident {
    /// The raw option string, without its leading separator
    pub fn opts(&self) -> Option<&str> {
        self.opts.as_deref()
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let (head, opts) = match uri.split_once(OPTS_SEP) {
            Some((head, "")) => (head, None),
            Some((head, opts)) => (head, Some(opts.to_string())),
            None => (uri, None),
        };
        let (scheme, target) = match head.split_once(':') {
            Some((scheme, target)) if !scheme.contains('/') => {
                let valid = (1..=4).contains(&scheme.len()) &&
                    scheme.bytes().all(|b| b.is_ascii_lowercase());
                if !valid {
                    return Err(Error::EINVAL);
                }
                (scheme, target)
            }
            _ => (DEFAULT_SCHEME, head)
        };
        let target = collapse_separators(target);
        if target.is_empty() || target.len() > TARGET_MAXLEN {
            return Err(Error::EINVAL);
        }
        Ok(Ident {
            scheme: scheme.to_string(),
            target,
            opts,
            dtype: DevType::Unknown,
            nsid: NSID_ALL,
            csi: Csi::Unknown,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.target)?;
        if let Some(opts) = &self.opts {
            write!(f, "{OPTS_SEP}{opts}")?;
        }
        Ok(())
    }
}

impl FromStr for Ident {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ident::parse(s)
    }
}

fn collapse_separators(target: &str) -> String {
    let mut out = String::with_capacity(target.len());
    let mut prev_sep = false;
    for c in target.chars() {
        if c == '/' && prev_sep {
            continue;
        }
        prev_sep = c == '/';
        out.push(c);
    }
    out
}

// LCOV_EXCL_STOP
