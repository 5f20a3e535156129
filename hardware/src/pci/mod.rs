// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI addressing and identification.

pub mod address;
pub mod class;
pub mod device;
pub mod vendor;

/// Errors which can occur while parsing a 16-bit PCI identifier from sysfs.
///
/// sysfs reports identifiers as `0x`-prefixed hexadecimal (e.g. `0x15b3`) while most
/// configuration sources use the bare form (e.g. `15b3`).  Both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPciId {
    #[error("empty PCI identifier")]
    Empty,
    #[error("\"{0}\" is not a valid 16-bit hexadecimal PCI identifier")]
    NotHex(String),
}

pub(crate) fn parse_hex_id(value: &str) -> Result<u16, InvalidPciId> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(InvalidPciId::Empty);
    }
    u16::from_str_radix(digits, 16).map_err(|_| InvalidPciId::NotHex(value.to_string()))
}
