// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Hardware addresses assigned to virtual functions.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Errors which can occur while parsing a [`Mac`] or a [`Guid`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{input}\" is not a valid {kind} address")]
pub struct InvalidHwAddr {
    kind: &'static str,
    input: String,
}

fn parse_octets<const N: usize>(kind: &'static str, input: &str) -> Result<[u8; N], InvalidHwAddr> {
    let err = || InvalidHwAddr {
        kind,
        input: input.to_string(),
    };
    let mut octets = [0u8; N];
    let mut parts = input.trim().split(':');
    for octet in &mut octets {
        let part = parts.next().ok_or_else(err)?;
        if part.len() != 2 {
            return Err(err());
        }
        *octet = u8::from_str_radix(part, 16).map_err(|_| err())?;
    }
    if parts.next().is_some() {
        return Err(err());
    }
    Ok(octets)
}

fn fmt_octets(octets: &[u8], f: &mut Formatter<'_>) -> std::fmt::Result {
    for (i, octet) in octets.iter().enumerate() {
        if i > 0 {
            write!(f, ":")?;
        }
        write!(f, "{octet:02x}")?;
    }
    Ok(())
}

/// An Ethernet MAC address.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// The zero `Mac`, which the kernel reports for VFs without an administrative address.
    pub const ZERO: Mac = Mac([0; 6]);

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }
}

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl AsRef<[u8; 6]> for Mac {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_octets(&self.0, f)
    }
}

impl FromStr for Mac {
    type Err = InvalidHwAddr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_octets("MAC", s).map(Mac)
    }
}

impl From<Mac> for String {
    fn from(value: Mac) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Mac {
    type Error = InvalidHwAddr;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A 64-bit InfiniBand GUID, displayed as eight colon separated octets.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Guid(pub [u8; 8]);

impl Guid {
    #[must_use]
    pub fn to_u64(self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl From<u64> for Guid {
    fn from(value: u64) -> Self {
        Guid(value.to_be_bytes())
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_octets(&self.0, f)
    }
}

impl FromStr for Guid {
    type Err = InvalidHwAddr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_octets("GUID", s).map(Guid)
    }
}

impl From<Guid> for String {
    fn from(value: Guid) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Guid {
    type Error = InvalidHwAddr;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{Guid, Mac};

    #[test]
    fn mac_text_form() {
        let mac: Mac = "0c:42:A1:de:ad:01\n".parse().unwrap();
        assert_eq!(mac.0, [0x0c, 0x42, 0xa1, 0xde, 0xad, 0x01]);
        assert_eq!(mac.to_string(), "0c:42:a1:de:ad:01");
        assert!("0c:42:a1:de:ad".parse::<Mac>().is_err());
        assert!("0c:42:a1:de:ad:01:02".parse::<Mac>().is_err());
        assert!("0c:42:a1:de:ad:1".parse::<Mac>().is_err());
        assert!("00:00:00:00:00:00".parse::<Mac>().unwrap().is_zero());
    }

    #[test]
    fn guid_is_big_endian() {
        let guid = Guid::from(0x0102_0304_0506_0708);
        assert_eq!(guid.to_string(), "01:02:03:04:05:06:07:08");
        assert_eq!(guid.to_u64(), 0x0102_0304_0506_0708);
        assert_eq!("01:02:03:04:05:06:07:08".parse::<Guid>().unwrap(), guid);
    }
}
