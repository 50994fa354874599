// vim: tw=80
//! Common utility functions used throughout nvmio

use crate::types::*;
use std::ops::{Add, Div, Sub};

/// Divide two unsigned numbers (usually integers), rounding up.
pub fn div_roundup<T>(dividend: T, divisor: T) -> T
    where T: Add<Output=T> + Copy + Div<Output=T> + From<u8> + Sub<Output=T>
{
    (dividend + divisor - T::from(1u8)) / divisor
}

/// Parse an unsigned number written either in decimal or as `0x` hex.
pub fn parse_num(s: &str) -> Result<u64> {
    let s = s.trim();
    let r = if let Some(hex) = s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    };
    r.map_err(|_| Error::EINVAL)
}

/// Parse a boolean flag.  Accepts `1`, `0`, `true` and `false`.
pub fn parse_flag(s: &str) -> Result<bool> {
    match s.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::EINVAL)
    }
}

/// Render a fixed-size, space- or NUL-padded ASCII field as a `String`.
pub fn ascii_field(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
}

// LCOV_EXCL_STOP
