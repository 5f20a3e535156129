// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Desired SR-IOV configuration of a node.

use crate::{ConfigError, ConfigResult};
use derive_builder::Builder;
use hardware::driver::UserspaceDriver;
use hardware::link::{EswitchMode, LinkType};
use hardware::pci::address::PciAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidVfRange {
    #[error("\"{0}\" is not a VF index or an index range like 0-7")]
    Syntax(String),
    #[error("VF range {start}-{end} is reversed")]
    Reversed { start: u32, end: u32 },
}

/// An inclusive range of VF indices, written `start-end` or as a single index.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VfRange {
    start: u32,
    end: u32,
}

impl VfRange {
    pub fn new(start: u32, end: u32) -> Result<Self, InvalidVfRange> {
        if start > end {
            return Err(InvalidVfRange::Reversed { start, end });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u32 {
        self.end
    }

    #[must_use]
    pub fn contains(&self, vf: u32) -> bool {
        (self.start..=self.end).contains(&vf)
    }
}

impl FromStr for VfRange {
    type Err = InvalidVfRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || InvalidVfRange::Syntax(s.to_string());
        let index = |v: &str| v.trim().parse::<u32>().map_err(|_| syntax());
        match s.split_once('-') {
            Some((start, end)) => VfRange::new(index(start)?, index(end)?),
            None => {
                let vf = index(s)?;
                VfRange::new(vf, vf)
            }
        }
    }
}

impl Display for VfRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl From<VfRange> for String {
    fn from(value: VfRange) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for VfRange {
    type Error = InvalidVfRange;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device type \"{0}\"")]
pub struct InvalidDeviceType(String);

/// How the VFs of a group are presented to workloads.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceType {
    /// Bound to the kernel's default driver for the VF.
    NetDevice,
    /// Bound to a userspace (DPDK style) driver.
    Userspace(UserspaceDriver),
}

impl DeviceType {
    const NETDEVICE: &'static str = "netdevice";

    #[must_use]
    pub fn userspace_driver(self) -> Option<UserspaceDriver> {
        match self {
            DeviceType::NetDevice => None,
            DeviceType::Userspace(driver) => Some(driver),
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::NetDevice => f.write_str(Self::NETDEVICE),
            DeviceType::Userspace(driver) => f.write_str(driver.name()),
        }
    }
}

impl FromStr for DeviceType {
    type Err = InvalidDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::NETDEVICE {
            return Ok(DeviceType::NetDevice);
        }
        s.parse::<UserspaceDriver>()
            .map(DeviceType::Userspace)
            .map_err(|_| InvalidDeviceType(s.to_string()))
    }
}

impl From<DeviceType> for String {
    fn from(value: DeviceType) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for DeviceType {
    type Error = InvalidDeviceType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A range of VFs sharing the same driver, MTU and RDMA policy.
#[derive(Builder, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into))]
pub struct VfGroup {
    #[serde(default)]
    #[builder(default)]
    pub resource_name: String,
    #[serde(default)]
    #[builder(default)]
    pub policy_name: String,
    pub device_type: DeviceType,
    pub vf_range: VfRange,
    /// Per VF MTU, 0 when unspecified.
    #[serde(default)]
    #[builder(default)]
    pub mtu: u32,
    #[serde(default)]
    #[builder(default)]
    pub is_rdma: bool,
}

/// The desired configuration of one physical function.
#[derive(Builder, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into))]
pub struct InterfaceSpec {
    pub pci_address: PciAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub name: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub num_vfs: u32,
    /// PF MTU, 0 when unspecified.
    #[serde(default)]
    #[builder(default)]
    pub mtu: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub link_type: Option<LinkType>,
    #[serde(default, rename = "eSwitchMode", skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub eswitch_mode: Option<EswitchMode>,
    #[serde(default)]
    #[builder(default)]
    pub externally_managed: bool,
    #[serde(default)]
    #[builder(default)]
    pub vf_groups: Vec<VfGroup>,
}

impl InterfaceSpec {
    /// The first group whose range contains `vf`.
    #[must_use]
    pub fn group_for(&self, vf: u32) -> Option<&VfGroup> {
        self.vf_groups.iter().find(|g| g.vf_range.contains(vf))
    }

    #[must_use]
    pub fn is_switchdev(&self) -> bool {
        self.eswitch_mode == Some(EswitchMode::Switchdev)
    }

    pub fn validate(&self) -> ConfigResult {
        for group in &self.vf_groups {
            if group.vf_range.end() >= self.num_vfs {
                return Err(ConfigError::Invalid {
                    pci: self.pci_address,
                    reason: format!(
                        "VF group {} ({}) exceeds the {} requested VFs",
                        group.resource_name, group.vf_range, self.num_vfs
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The desired SR-IOV configuration of a node.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub interfaces: Vec<InterfaceSpec>,
}

impl NodeSpec {
    #[must_use]
    pub fn get(&self, pci: &PciAddress) -> Option<&InterfaceSpec> {
        self.interfaces.iter().find(|i| i.pci_address == *pci)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("loading node spec from {}", path.display());
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = Self::from_yaml(&yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Reject duplicate PCI addresses and VF groups outside the requested VF count.
    pub fn validate(&self) -> ConfigResult {
        let mut seen = BTreeSet::new();
        for iface in &self.interfaces {
            if !seen.insert(iface.pci_address) {
                return Err(ConfigError::Invalid {
                    pci: iface.pci_address,
                    reason: "configured more than once".to_string(),
                });
            }
            iface.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn vf_ranges() {
        let r: VfRange = "2-5".parse().unwrap();
        assert!(r.contains(2) && r.contains(5) && !r.contains(6) && !r.contains(1));
        let single: VfRange = "7".parse().unwrap();
        assert_eq!((single.start(), single.end()), (7, 7));
        assert_eq!(
            "5-2".parse::<VfRange>(),
            Err(InvalidVfRange::Reversed { start: 5, end: 2 })
        );
        assert!(matches!("a-b".parse::<VfRange>(), Err(InvalidVfRange::Syntax(_))));
        assert!(matches!("".parse::<VfRange>(), Err(InvalidVfRange::Syntax(_))));
    }

    #[test]
    fn device_types() {
        assert_eq!("netdevice".parse::<DeviceType>().unwrap(), DeviceType::NetDevice);
        assert_eq!(
            "vfio-pci".parse::<DeviceType>().unwrap(),
            DeviceType::Userspace(UserspaceDriver::VfioPci)
        );
        assert_eq!(DeviceType::Userspace(UserspaceDriver::IgbUio).to_string(), "igb_uio");
        assert!("mlx5_core".parse::<DeviceType>().is_err());
    }

    const NODE_SPEC: &str = r#"
interfaces:
  - pciAddress: "0000:3b:00.0"
    name: ens1f0
    numVfs: 8
    mtu: 9000
    linkType: eth
    vfGroups:
      - resourceName: kernel_vfs
        deviceType: netdevice
        vfRange: "0-3"
        mtu: 1500
      - resourceName: dpdk_vfs
        deviceType: vfio-pci
        vfRange: "4-7"
  - pciAddress: "0000:3b:00.1"
    numVfs: 2
    externallyManaged: true
    eSwitchMode: switchdev
"#;

    #[test]
    fn node_spec_from_yaml() {
        let spec = NodeSpec::from_yaml(NODE_SPEC).unwrap();
        spec.validate().unwrap();
        assert_eq!(spec.interfaces.len(), 2);

        let first = spec.get(&"0000:3b:00.0".parse().unwrap()).unwrap();
        assert_eq!(first.num_vfs, 8);
        assert_eq!(first.link_type, Some(LinkType::Ethernet));
        assert_eq!(first.group_for(2).unwrap().resource_name, "kernel_vfs");
        assert_eq!(first.group_for(2).unwrap().mtu, 1500);
        assert_eq!(
            first.group_for(6).unwrap().device_type,
            DeviceType::Userspace(UserspaceDriver::VfioPci)
        );
        assert!(first.group_for(8).is_none());

        let second = spec.get(&"0000:3b:00.1".parse().unwrap()).unwrap();
        assert!(second.externally_managed);
        assert!(second.is_switchdev());
        assert!(second.vf_groups.is_empty());
    }

    #[test]
    fn builder_defaults() {
        let spec = InterfaceSpecBuilder::default()
            .pci_address("0000:18:00.0".parse::<PciAddress>().unwrap())
            .num_vfs(4u32)
            .vf_groups(vec![
                VfGroupBuilder::default()
                    .device_type(DeviceType::NetDevice)
                    .vf_range(VfRange::new(0, 3).unwrap())
                    .build()
                    .unwrap(),
            ])
            .build()
            .unwrap();
        assert_eq!(spec.mtu, 0);
        assert!(!spec.externally_managed);
        assert_eq!(spec.eswitch_mode, None);
        spec.validate().unwrap();
    }

    #[test]
    fn duplicate_interfaces_are_rejected() {
        let spec = NodeSpec::from_yaml(
            r#"
interfaces:
  - pciAddress: "0000:3b:00.0"
  - pciAddress: "0000:3b:00.0"
"#,
        )
        .unwrap();
        assert!(matches!(spec.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn groups_must_fit_requested_vfs() {
        let spec = NodeSpec::from_yaml(
            r#"
interfaces:
  - pciAddress: "0000:3b:00.0"
    numVfs: 4
    vfGroups:
      - deviceType: netdevice
        vfRange: "0-4"
"#,
        )
        .unwrap();
        assert!(matches!(spec.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.yaml");
        std::fs::write(&path, NODE_SPEC).unwrap();
        assert_eq!(NodeSpec::load(&path).unwrap().interfaces.len(), 2);
        assert!(matches!(
            NodeSpec::load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
