// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI class codes.

/// Errors which can occur while parsing a [`PciClass`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not a valid 24-bit PCI class code")]
pub struct InvalidPciClass(String);

/// The 24-bit class code of a PCI function as reported in sysfs (e.g. `0x020000`).
///
/// The top byte is the base class, followed by the subclass and the programming interface.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct PciClass(u32);

impl PciClass {
    /// Base class of network controllers.
    pub const NETWORK_BASE_CLASS: u8 = 0x02;

    /// Build a class code from its raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` does not fit in 24 bits.
    pub fn new(raw: u32) -> Result<Self, InvalidPciClass> {
        if raw > 0x00ff_ffff {
            return Err(InvalidPciClass(format!("{raw:#x}")));
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn base_class(self) -> u8 {
        // top byte of a 24-bit value always fits
        #[allow(clippy::cast_possible_truncation)]
        let base = (self.0 >> 16) as u8;
        base
    }

    /// True if the function is a network controller of any kind.
    #[must_use]
    pub fn is_network(self) -> bool {
        self.base_class() == Self::NETWORK_BASE_CLASS
    }
}

impl TryFrom<&str> for PciClass {
    type Error = InvalidPciClass;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let raw =
            u32::from_str_radix(digits, 16).map_err(|_| InvalidPciClass(value.to_string()))?;
        PciClass::new(raw)
    }
}

impl std::fmt::Display for PciClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#08x}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::PciClass;

    #[test]
    fn network_controllers_are_recognized() {
        let eth = PciClass::try_from("0x020000\n").unwrap();
        assert!(eth.is_network());
        assert_eq!(eth.to_string(), "0x020000");
        let ib = PciClass::try_from("0x020700").unwrap();
        assert!(ib.is_network());
        let nvme = PciClass::try_from("0x010802").unwrap();
        assert!(!nvme.is_network());
    }

    #[test]
    fn out_of_range_and_garbage_are_rejected() {
        assert!(PciClass::try_from("0x1000000").is_err());
        assert!(PciClass::try_from("network").is_err());
        assert!(PciClass::try_from("").is_err());
    }
}
