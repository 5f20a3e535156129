// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Observed SR-IOV state of a node.

use crate::ConfigError;
use hardware::link::{EswitchMode, LinkType};
use hardware::pci::address::PciAddress;
use hardware::pci::device::DeviceId;
use hardware::pci::vendor::VendorId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A provisioned virtual function as seen during discovery.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualFunction {
    pub pci_address: PciAddress,
    pub vf_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<VendorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// 0 when unknown.
    #[serde(default)]
    pub mtu: u32,
}

impl VirtualFunction {
    #[must_use]
    pub fn new(pci_address: PciAddress, vf_id: u32) -> Self {
        Self {
            pci_address,
            vf_id,
            driver: None,
            vendor: None,
            device_id: None,
            name: None,
            mac: None,
            mtu: 0,
        }
    }
}

/// An SR-IOV capable physical function as seen during discovery.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalFunction {
    pub pci_address: PciAddress,
    pub driver: String,
    pub vendor: VendorId,
    pub device_id: DeviceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// 0 when unknown.
    #[serde(default)]
    pub mtu: u32,
    /// For example `25000 Mb/s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_speed: Option<String>,
    #[serde(default)]
    pub link_type: LinkType,
    #[serde(default, rename = "eSwitchMode", skip_serializing_if = "Option::is_none")]
    pub eswitch_mode: Option<EswitchMode>,
    #[serde(default)]
    pub total_vfs: u32,
    #[serde(default)]
    pub num_vfs: u32,
    #[serde(default)]
    pub externally_managed: bool,
    #[serde(default, rename = "Vfs")]
    pub vfs: Vec<VirtualFunction>,
}

impl PhysicalFunction {
    #[must_use]
    pub fn new(
        pci_address: PciAddress,
        driver: impl Into<String>,
        vendor: VendorId,
        device_id: DeviceId,
    ) -> Self {
        Self {
            pci_address,
            driver: driver.into(),
            vendor,
            device_id,
            name: None,
            mac: None,
            mtu: 0,
            link_speed: None,
            link_type: LinkType::Unknown,
            eswitch_mode: None,
            total_vfs: 0,
            num_vfs: 0,
            externally_managed: false,
            vfs: vec![],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, strum::Display)]
pub enum SyncStatus {
    #[default]
    InProgress,
    Succeeded,
    Failed,
}

/// What the agent publishes after every pass.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub interfaces: Vec<PhysicalFunction>,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<String>,
}

impl NodeStatus {
    #[must_use]
    pub fn get(&self, pci: &PciAddress) -> Option<&PhysicalFunction> {
        self.interfaces.iter().find(|pf| pf.pci_address == *pci)
    }

    /// Write the status as YAML, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml_ng::to_string(self)?;
        let tmp = path.with_extension("tmp");
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(&tmp, yaml).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)
    }
}
