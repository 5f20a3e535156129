// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI device IDs.

use crate::pci::{InvalidPciId, parse_hex_id};

/// A 16-bit PCI device identifier.
///
/// Device ids are only meaningful in combination with a [`VendorId`].  SR-IOV capable
/// NICs expose one device id for the physical function and a different one for the
/// virtual functions it spawns.
///
/// [`VendorId`]: crate::pci::vendor::VendorId
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
#[repr(transparent)]
pub struct DeviceId(u16);

impl DeviceId {
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl std::fmt::LowerHex for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:x}")
    }
}

impl From<DeviceId> for String {
    fn from(value: DeviceId) -> Self {
        format!("{value:x}")
    }
}

impl TryFrom<&str> for DeviceId {
    type Error = InvalidPciId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        parse_hex_id(value).map(DeviceId)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = InvalidPciId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DeviceId::try_from(value.as_str())
    }
}
