// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI addresses in `domain:bus:device.function` form.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Errors which can occur while parsing a [`PciAddress`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPciAddress {
    #[error("\"{0}\" is not of the form dddd:bb:dd.f")]
    Syntax(String),
    #[error("device number {0} is out of range (must be < 32)")]
    Device(u8),
    #[error("function number {0} is out of range (must be < 8)")]
    Function(u8),
}

/// The address of a PCI function, e.g. `0000:3b:00.1`.
///
/// Both physical and virtual functions are identified by their address, which is stable for
/// the lifetime of the function and is the name of its directory under
/// `/sys/bus/pci/devices`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
}

impl PciAddress {
    /// Build a [`PciAddress`] from its components.
    ///
    /// # Errors
    ///
    /// Returns an error if `device` or `function` does not fit in the 5 and 3 bits the PCI
    /// specification allows for them.
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        if device >= 32 {
            return Err(InvalidPciAddress::Device(device));
        }
        if function >= 8 {
            return Err(InvalidPciAddress::Function(function));
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }

    #[must_use]
    pub fn domain(&self) -> u16 {
        self.domain
    }

    #[must_use]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    #[must_use]
    pub fn device(&self) -> u8 {
        self.device
    }

    #[must_use]
    pub fn function(&self) -> u8 {
        self.function
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || InvalidPciAddress::Syntax(s.to_string());
        let s_trim = s.trim();
        let (domain, rest) = s_trim.split_once(':').ok_or_else(syntax)?;
        let (bus, rest) = rest.split_once(':').ok_or_else(syntax)?;
        let (device, function) = rest.split_once('.').ok_or_else(syntax)?;
        if domain.len() != 4 || bus.len() != 2 || device.len() != 2 || function.len() != 1 {
            return Err(syntax());
        }
        let domain = u16::from_str_radix(domain, 16).map_err(|_| syntax())?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| syntax())?;
        let device = u8::from_str_radix(device, 16).map_err(|_| syntax())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| syntax())?;
        PciAddress::new(domain, bus, device, function)
    }
}

impl From<PciAddress> for String {
    fn from(value: PciAddress) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{InvalidPciAddress, PciAddress};
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_and_display_agree() {
        let addr: PciAddress = "0000:3b:00.1".parse().unwrap();
        assert_eq!(addr.domain(), 0);
        assert_eq!(addr.bus(), 0x3b);
        assert_eq!(addr.device(), 0);
        assert_eq!(addr.function(), 1);
        assert_eq!(addr.to_string(), "0000:3b:00.1");
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        for bad in ["", "3b:00.1", "0000:3b:00", "0000-3b-00.1", "0000:3b:0.1", "zzzz:3b:00.1"] {
            assert!(
                matches!(bad.parse::<PciAddress>(), Err(InvalidPciAddress::Syntax(_))),
                "{bad} should not parse"
            );
        }
        assert_eq!(
            "0000:3b:20.0".parse::<PciAddress>(),
            Err(InvalidPciAddress::Device(0x20))
        );
        assert_eq!(
            "0000:3b:00.8".parse::<PciAddress>(),
            Err(InvalidPciAddress::Function(8))
        );
    }

    #[test]
    fn ordering_follows_bus_position() {
        let mut addrs: Vec<PciAddress> = ["0000:3b:00.1", "0000:18:00.0", "0000:3b:00.0"]
            .into_iter()
            .map(|a| a.parse().unwrap())
            .collect();
        addrs.sort();
        let rendered: Vec<String> = addrs.into_iter().map(String::from).collect();
        assert_eq!(rendered, ["0000:18:00.0", "0000:3b:00.0", "0000:3b:00.1"]);
    }

    #[test]
    fn serde_uses_string_form() {
        let addr: PciAddress = serde_yaml_ng::from_str("\"0000:af:00.0\"").unwrap();
        assert_eq!(addr.bus(), 0xaf);
        assert_eq!(serde_yaml_ng::to_string(&addr).unwrap().trim(), "0000:af:00.0");
    }
}
