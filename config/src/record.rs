// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The record of the last configuration applied to a physical function.

use crate::spec::InterfaceSpec;
use hardware::pci::address::PciAddress;
use serde::{Deserialize, Serialize};

/// Remembered across agent restarts so that a PF which disappears from the desired
/// configuration can be told apart from one which was never configured by us.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PfStatusRecord {
    pub pci_address: PciAddress,
    pub externally_managed: bool,
    pub applied: InterfaceSpec,
}

impl From<&InterfaceSpec> for PfStatusRecord {
    fn from(spec: &InterfaceSpec) -> Self {
        Self {
            pci_address: spec.pci_address,
            externally_managed: spec.externally_managed,
            applied: spec.clone(),
        }
    }
}

impl PfStatusRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::PfStatusRecord;
    use crate::spec::InterfaceSpecBuilder;
    use hardware::pci::address::PciAddress;

    #[test]
    fn record_follows_spec() {
        let spec = InterfaceSpecBuilder::default()
            .pci_address("0000:3b:00.0".parse::<PciAddress>().unwrap())
            .num_vfs(4u32)
            .externally_managed(true)
            .build()
            .unwrap();
        let record = PfStatusRecord::from(&spec);
        assert!(record.externally_managed);
        let json = record.to_json().unwrap();
        assert!(json.contains("\"externallyManaged\": true"));
        assert_eq!(PfStatusRecord::from_json(&json).unwrap(), record);
    }
}
