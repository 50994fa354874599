// vim: tw=80
//! Device-agnostic access to NVMe and block storage
//!
//! A [`Device`](dev::Device) is opened from a URI by the first backend in a
//! [`Registry`](be::Registry) that can handle it.  Commands are then issued
//! synchronously through a [`CmdCtx`](cmd::CmdCtx), or asynchronously through
//! a [`Queue`](queue::Queue).

// I don't find this lint very helpful
#![allow(clippy::type_complexity)]

// Acronyms like "ENOSYS" and "NVM" read better in upper case.
#![allow(clippy::upper_case_acronyms)]

pub mod adm;
pub mod be;
pub mod buf;
pub mod cmd;
pub mod dev;
pub mod geo;
pub mod ident;
pub mod idfy;
pub mod nvm;
pub mod opts;
pub mod queue;
pub mod spec;
pub mod types;
pub mod util;
pub mod znd;

pub use crate::types::*;
