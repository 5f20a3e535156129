// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI drivers which hand a function over to userspace.

/// A driver which exposes a PCI function to a userspace (DPDK style) application instead of
/// the kernel network stack.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UserspaceDriver {
    #[strum(serialize = "vfio-pci")]
    #[cfg_attr(feature = "serde", serde(rename = "vfio-pci"))]
    VfioPci,
    #[strum(serialize = "igb_uio")]
    #[cfg_attr(feature = "serde", serde(rename = "igb_uio"))]
    IgbUio,
    #[strum(serialize = "uio_pci_generic")]
    #[cfg_attr(feature = "serde", serde(rename = "uio_pci_generic"))]
    UioPciGeneric,
}

impl UserspaceDriver {
    /// The name of the driver as it appears under `/sys/bus/pci/drivers`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// True if `driver` names one of the userspace drivers.
    #[must_use]
    pub fn is_userspace(driver: &str) -> bool {
        driver.parse::<UserspaceDriver>().is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::UserspaceDriver;
    use strum::IntoEnumIterator;

    #[test]
    fn names_match_kernel_drivers() {
        let names: Vec<&str> = UserspaceDriver::iter().map(UserspaceDriver::name).collect();
        assert_eq!(names, ["vfio-pci", "igb_uio", "uio_pci_generic"]);
        assert!(UserspaceDriver::is_userspace("vfio-pci"));
        assert!(!UserspaceDriver::is_userspace("mlx5_core"));
        assert!(!UserspaceDriver::is_userspace(""));
    }
}
