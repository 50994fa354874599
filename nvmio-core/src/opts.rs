// vim: tw=80
//! Options that control how a device is opened

use crate::{
    be::MixinKind,
    ident::OPTS_SEP,
    types::*,
    util::{parse_flag, parse_num},
};
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

/// Device open options.
///
/// Read from, in increasing order of precedence: the defaults, an optional
/// YAML document, and the options embedded in the device URI.  Frozen once
/// the device is open, at which point the names of the chosen backend and
/// mixins have been filled in.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Opts {
    /// Preferred backend
    pub be: Option<String>,
    /// Preferred device-lifecycle mixin.  Informational only.
    pub dev: Option<String>,
    /// Preferred memory mixin
    pub mem: Option<String>,
    /// Preferred synchronous command mixin
    pub sync: Option<String>,
    /// Preferred asynchronous command mixin
    #[serde(rename = "async")]
    pub async_: Option<String>,
    /// Preferred administrative command mixin
    pub admin: Option<String>,

    /// Namespace to use
    pub nsid: NsidT,

    pub rdonly: bool,
    pub wronly: bool,
    pub rdwr: bool,
    pub create: bool,
    pub truncate: bool,
    pub direct: bool,
    /// Permissions of a file created because of `create`
    pub create_mode: u32,

    pub poll_io: bool,
    pub poll_sq: bool,
    pub register_files: bool,
    pub register_buffers: bool,

    pub shm_id: Option<u64>,
    pub main_core: Option<u32>,
    pub core_mask: Option<String>,

    pub adrfam: Option<String>,
    pub subnqn: Option<String>,
    pub hostnqn: Option<String>,
}

impl Default for Opts {
    fn default() -> Self {
        Opts {
            be: None,
            dev: None,
            mem: None,
            sync: None,
            async_: None,
            admin: None,
            nsid: 1,
            rdonly: false,
            wronly: false,
            rdwr: true,
            create: false,
            truncate: false,
            direct: false,
            create_mode: 0o600,
            poll_io: false,
            poll_sq: false,
            register_files: false,
            register_buffers: false,
            shm_id: None,
            main_core: None,
            core_mask: None,
            adrfam: None,
            subnqn: None,
            hostnqn: None,
        }
    }
}

impl Opts {
    /// Load options from a YAML document.  Absent keys take their defaults.
    pub fn from_yaml(s: &str) -> Result<Self> {
        serde_yaml_ng::from_str(s).map_err(|e| {
            debug!(error = %e, "invalid options document");
            Error::EINVAL
        })
    }

    /// Apply options in the URI form `key=val[?key=val...]`.
    ///
    /// Unrecognized keys are skipped, since downstream mixins may consume
    /// them.  A recognized key with a malformed value is an error.
    pub fn apply_uri_options(&mut self, s: &str) -> Result<()> {
        for pair in s.split(OPTS_SEP).filter(|p| !p.is_empty()) {
            let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
            self.set(key, val)?;
        }
        Ok(())
    }

    /// Set a single option by name.
    pub fn set(&mut self, key: &str, val: &str) -> Result<()> {
        let name = || -> Result<Option<String>> {
            if val.is_empty() {
                Err(Error::EINVAL)
            } else {
                Ok(Some(val.to_string()))
            }
        };
        match key {
            "be" => self.be = name()?,
            "dev" => self.dev = name()?,
            "mem" => self.mem = name()?,
            "sync" => self.sync = name()?,
            "async" => self.async_ = name()?,
            "admin" => self.admin = name()?,
            "nsid" => {
                self.nsid = NsidT::try_from(parse_num(val)?)
                    .map_err(|_| Error::ERANGE)?
            }
            "rdonly" => self.rdonly = parse_flag(val)?,
            "wronly" => self.wronly = parse_flag(val)?,
            "rdwr" => self.rdwr = parse_flag(val)?,
            "create" => self.create = parse_flag(val)?,
            "truncate" => self.truncate = parse_flag(val)?,
            "direct" => self.direct = parse_flag(val)?,
            "create_mode" => {
                self.create_mode = u32::from_str_radix(val, 8)
                    .map_err(|_| Error::EINVAL)?
            }
            "poll_io" => self.poll_io = parse_flag(val)?,
            "poll_sq" => self.poll_sq = parse_flag(val)?,
            "register_files" => self.register_files = parse_flag(val)?,
            "register_buffers" => self.register_buffers = parse_flag(val)?,
            "shm_id" => self.shm_id = Some(parse_num(val)?),
            "main_core" => {
                self.main_core = Some(u32::try_from(parse_num(val)?)
                    .map_err(|_| Error::ERANGE)?)
            }
            "core_mask" => self.core_mask = name()?,
            "adrfam" => self.adrfam = name()?,
            "subnqn" => self.subnqn = name()?,
            "hostnqn" => self.hostnqn = name()?,
            _ => debug!(key, "ignoring unrecognized option"),
        }
        Ok(())
    }

    /// The mixin name requested for a given kind, if any
    pub fn mixin_name(&self, kind: MixinKind) -> Option<&str> {
        match kind {
            MixinKind::Mem => self.mem.as_deref(),
            MixinKind::Admin => self.admin.as_deref(),
            MixinKind::Sync => self.sync.as_deref(),
            MixinKind::Async => self.async_.as_deref(),
            // The device-lifecycle mixin is chosen by the backend alone
            MixinKind::Dev => None,
        }
    }
}

// LCOV_EXCL_STOP
