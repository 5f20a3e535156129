// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI vendor IDs.
//!
//! This module provides the [`VendorId`] type for representing 16-bit PCI
//! vendor identifiers, along with the vendors whose NICs this project knows how to
//! configure.
//!
//! # Examples
//!
//! ```
//! use sriov_hardware::pci::vendor::VendorId;
//!
//! let mellanox = VendorId::try_from("0x15b3").unwrap();
//! assert_eq!(mellanox, VendorId::MELLANOX);
//! assert_eq!(format!("{mellanox}"), "15b3");
//! ```

use crate::pci::{InvalidPciId, parse_hex_id};

/// A 16-bit PCI vendor identifier.
///
/// Vendor IDs are assigned by the PCI-SIG to uniquely identify device
/// manufacturers. The special value `0xFFFF` is reserved and indicates
/// an invalid/non-existent device.
///
/// # Display
///
/// The `Display` and `LowerHex` implementations format the vendor ID
/// as a 4-digit hexadecimal value with leading zeros and no `0x` prefix, which is the
/// form used in udev rules and NIC model tables.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    num_derive::FromPrimitive,
    num_derive::ToPrimitive,
)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
#[repr(transparent)]
pub struct VendorId(u16);

impl VendorId {
    /// Mellanox Technologies (NVIDIA networking).
    pub const MELLANOX: VendorId = VendorId(0x15b3);
    /// Intel Corporation.
    pub const INTEL: VendorId = VendorId(0x8086);
    /// Broadcom.
    pub const BROADCOM: VendorId = VendorId(0x14e4);
    /// QLogic.
    pub const QLOGIC: VendorId = VendorId(0x1077);
    /// Red Hat (virtio).
    pub const RED_HAT: VendorId = VendorId(0x1af4);

    /// Creates a new vendor ID.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw vendor ID value.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Checks if this vendor ID is the reserved invalid value.
    ///
    /// ```
    /// use sriov_hardware::pci::vendor::VendorId;
    ///
    /// assert!(!VendorId::INTEL.is_invalid());
    /// assert!(VendorId::new(0xFFFF).is_invalid());
    /// ```
    #[must_use]
    pub fn is_invalid(self) -> bool {
        self.0 == 0xFFFF
    }
}

impl std::fmt::LowerHex for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:x}")
    }
}

impl From<VendorId> for String {
    fn from(value: VendorId) -> Self {
        format!("{value:x}")
    }
}

impl TryFrom<&str> for VendorId {
    type Error = InvalidPciId;

    /// Parses a vendor ID from a hexadecimal string, with or without a `0x` prefix.
    ///
    /// ```
    /// use sriov_hardware::pci::vendor::VendorId;
    ///
    /// assert_eq!(VendorId::try_from("8086").unwrap(), VendorId::INTEL);
    /// assert_eq!(VendorId::try_from("0x8086\n").unwrap(), VendorId::INTEL);
    /// assert!(VendorId::try_from("GGGG").is_err());
    /// ```
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        parse_hex_id(value).map(VendorId)
    }
}

impl TryFrom<String> for VendorId {
    type Error = InvalidPciId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VendorId::try_from(value.as_str())
    }
}
