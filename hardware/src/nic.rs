// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! SR-IOV capable NIC models.
//!
//! Only physical functions whose `vendor:device` pair appears in a [`SupportedModels`] table
//! are managed (unless the caller explicitly opts into unsupported devices).  The table also
//! records the device id of the virtual functions each model spawns, which is what the
//! NetworkManager udev rules match on.

use crate::pci::device::DeviceId;
use crate::pci::vendor::VendorId;

/// One NIC model known to support SR-IOV.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SupportedModel {
    pub name: String,
    pub vendor: VendorId,
    #[cfg_attr(feature = "serde", serde(rename = "pfDevice"))]
    pub pf_device: DeviceId,
    #[cfg_attr(feature = "serde", serde(rename = "vfDevice"))]
    pub vf_device: DeviceId,
}

impl SupportedModel {
    fn builtin(name: &str, vendor: VendorId, pf_device: u16, vf_device: u16) -> Self {
        Self {
            name: name.to_string(),
            vendor,
            pf_device: DeviceId::new(pf_device),
            vf_device: DeviceId::new(vf_device),
        }
    }
}

/// The allow-list of NIC models.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SupportedModels(Vec<SupportedModel>);

impl SupportedModels {
    #[must_use]
    pub fn new(models: Vec<SupportedModel>) -> Self {
        Self(models)
    }

    #[must_use]
    pub fn models(&self) -> &[SupportedModel] {
        &self.0
    }

    /// True if a physical function with this `vendor:device` pair is on the allow-list.
    #[must_use]
    pub fn is_supported(&self, vendor: VendorId, device: DeviceId) -> bool {
        self.0
            .iter()
            .any(|m| m.vendor == vendor && m.pf_device == device)
    }

    /// The distinct VF device ids of all models, in table order.
    #[must_use]
    pub fn vf_device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = Vec::with_capacity(self.0.len());
        for model in &self.0 {
            if !ids.contains(&model.vf_device) {
                ids.push(model.vf_device);
            }
        }
        ids
    }
}

impl Default for SupportedModels {
    fn default() -> Self {
        use SupportedModel as M;
        const INTEL: VendorId = VendorId::INTEL;
        const MLX: VendorId = VendorId::MELLANOX;
        Self(vec![
            M::builtin("Intel_i40e_XXV710", INTEL, 0x158a, 0x154c),
            M::builtin("Intel_i40e_25G_SFP28", INTEL, 0x158b, 0x154c),
            M::builtin("Intel_i40e_10G_X710_SFP", INTEL, 0x1572, 0x154c),
            M::builtin("Intel_i40e_XXV710_N3000", INTEL, 0x0d58, 0x154c),
            M::builtin("Intel_i40e_40G_XL710_QSFP", INTEL, 0x1583, 0x154c),
            M::builtin("Intel_ice_Columbiaville_E810-CQDA2_2CQDA2", INTEL, 0x1592, 0x1889),
            M::builtin("Intel_ice_Columbiaville_E810-XXVDA4", INTEL, 0x1593, 0x1889),
            M::builtin("Intel_ice_Columbiaville_E810-XXVDA2", INTEL, 0x159b, 0x1889),
            M::builtin("Intel_ixgbe_10G_X550", INTEL, 0x1563, 0x1565),
            M::builtin("Intel_ixgbe_82576", INTEL, 0x10c9, 0x10ca),
            M::builtin("Nvidia_mlx5_ConnectX-4", MLX, 0x1013, 0x1014),
            M::builtin("Nvidia_mlx5_ConnectX-4LX", MLX, 0x1015, 0x1016),
            M::builtin("Nvidia_mlx5_ConnectX-5", MLX, 0x1017, 0x1018),
            M::builtin("Nvidia_mlx5_ConnectX-5_Ex", MLX, 0x1019, 0x101a),
            M::builtin("Nvidia_mlx5_ConnectX-6", MLX, 0x101b, 0x101c),
            M::builtin("Nvidia_mlx5_ConnectX-6_Dx", MLX, 0x101d, 0x101e),
            M::builtin("Nvidia_mlx5_ConnectX-6_Lx", MLX, 0x101f, 0x101e),
            M::builtin("Nvidia_mlx5_ConnectX-7", MLX, 0x1021, 0x101e),
            M::builtin("Nvidia_mlx5_MT42822_BlueField-2_integrated_ConnectX-6_Dx", MLX, 0xa2d6, 0x101e),
            M::builtin("Nvidia_mlx5_MT43244_BlueField-3_integrated_ConnectX-7_Dx", MLX, 0xa2dc, 0x101e),
            M::builtin("Broadcom_bnxt_BCM57414_2x25G", VendorId::BROADCOM, 0x16d7, 0x16dc),
            M::builtin("Broadcom_bnxt_BCM75508_2x100G", VendorId::BROADCOM, 0x1750, 0x1806),
            M::builtin("Qlogic_qede_QL45000_50G", VendorId::QLOGIC, 0x1654, 0x1664),
            M::builtin("Red_Hat_Virtio_network_device", VendorId::RED_HAT, 0x1000, 0x1000),
        ])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{SupportedModel, SupportedModels};
    use crate::pci::device::DeviceId;
    use crate::pci::vendor::VendorId;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_table_knows_bluefield() {
        let models = SupportedModels::default();
        assert!(models.is_supported(VendorId::MELLANOX, DeviceId::new(0xa2d6)));
        assert!(models.is_supported(VendorId::MELLANOX, DeviceId::new(0xa2dc)));
        // a VF device id is not a supported PF
        assert!(!models.is_supported(VendorId::MELLANOX, DeviceId::new(0x101e)));
        assert!(!models.is_supported(VendorId::INTEL, DeviceId::new(0x1013)));
    }

    #[test]
    fn vf_device_ids_are_deduplicated_in_order() {
        let models = SupportedModels::new(vec![
            SupportedModel {
                name: "a".into(),
                vendor: VendorId::INTEL,
                pf_device: DeviceId::new(0x158a),
                vf_device: DeviceId::new(0x154c),
            },
            SupportedModel {
                name: "b".into(),
                vendor: VendorId::INTEL,
                pf_device: DeviceId::new(0x1572),
                vf_device: DeviceId::new(0x154c),
            },
            SupportedModel {
                name: "c".into(),
                vendor: VendorId::MELLANOX,
                pf_device: DeviceId::new(0x101d),
                vf_device: DeviceId::new(0x101e),
            },
        ]);
        assert_eq!(
            models.vf_device_ids(),
            vec![DeviceId::new(0x154c), DeviceId::new(0x101e)]
        );
    }

    #[test]
    fn table_loads_from_yaml() {
        let yaml = r#"
- name: Intel_ice_Columbiaville_E810
  vendor: "8086"
  pfDevice: "1593"
  vfDevice: "1889"
"#;
        let models: SupportedModels = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(models.models().len(), 1);
        assert!(models.is_supported(VendorId::INTEL, DeviceId::new(0x1593)));
        assert_eq!(models.vf_device_ids(), vec![DeviceId::new(0x1889)]);
    }
}
