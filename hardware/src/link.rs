// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link layer properties of network functions.

/// The link layer a network function runs.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, strum::Display, strum::EnumString,
)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum LinkType {
    #[strum(serialize = "eth")]
    #[cfg_attr(feature = "serde", serde(rename = "eth"))]
    Ethernet,
    #[strum(serialize = "ib")]
    #[cfg_attr(feature = "serde", serde(rename = "ib"))]
    Infiniband,
    #[default]
    #[strum(serialize = "unknown")]
    Unknown,
}

impl LinkType {
    /// The MTU a function of this link type falls back to when its VFs are torn down and no
    /// better value is known.
    #[must_use]
    pub fn default_mtu(self) -> u32 {
        match self {
            LinkType::Infiniband => 2048,
            LinkType::Ethernet | LinkType::Unknown => 1500,
        }
    }
}

/// The mode of the embedded switch of a NIC.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum EswitchMode {
    Legacy,
    Switchdev,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{EswitchMode, LinkType};
    use std::str::FromStr;

    #[test]
    fn link_type_names() {
        assert_eq!(LinkType::from_str("eth").unwrap(), LinkType::Ethernet);
        assert_eq!(LinkType::from_str("ib").unwrap(), LinkType::Infiniband);
        assert_eq!(LinkType::Infiniband.to_string(), "ib");
        assert!(LinkType::from_str("token-ring").is_err());
    }

    #[test]
    fn default_mtus() {
        assert_eq!(LinkType::Ethernet.default_mtu(), 1500);
        assert_eq!(LinkType::Infiniband.default_mtu(), 2048);
    }

    #[test]
    fn eswitch_mode_names() {
        assert_eq!(EswitchMode::from_str("switchdev").unwrap(), EswitchMode::Switchdev);
        assert_eq!(EswitchMode::Legacy.to_string(), "legacy");
        let parsed: EswitchMode = serde_yaml_ng::from_str("legacy").unwrap();
        assert_eq!(parsed, EswitchMode::Legacy);
    }
}
