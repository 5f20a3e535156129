// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Values fixed at startup and shared by every pass.

use crate::udev::UdevRules;
use common::RetryPolicy;
use config::PhysicalFunction;
use hardware::nic::SupportedModels;
use hardware::pci::address::PciAddress;

/// The kind of cluster the node belongs to.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ClusterType {
    #[default]
    Kubernetes,
    Openshift,
}

/// The PFs of the node as found when the agent started.
///
/// Used to restore the original MTU of a PF when its VFs are torn down.
#[derive(Clone, Debug, Default)]
pub struct InitialNodeState {
    interfaces: Vec<PhysicalFunction>,
}

impl InitialNodeState {
    #[must_use]
    pub fn new(interfaces: Vec<PhysicalFunction>) -> Self {
        Self { interfaces }
    }

    #[must_use]
    pub fn get(&self, pci: &PciAddress) -> Option<&PhysicalFunction> {
        self.interfaces.iter().find(|pf| pf.pci_address == *pci)
    }

    /// The MTU `pci` had at startup, if it was known.
    #[must_use]
    pub fn mtu(&self, pci: &PciAddress) -> Option<u32> {
        self.get(pci).map(|pf| pf.mtu).filter(|mtu| *mtu > 0)
    }
}

/// Everything a pass needs besides the host, the store and the states it reconciles.
#[derive(Clone, Debug)]
pub struct EngineContext {
    pub cluster_type: ClusterType,
    pub initial_state: InitialNodeState,
    pub udev: UdevRules,
    pub models: SupportedModels,
    /// Also report network devices which are not in `models`.
    pub with_unsupported: bool,
    pub mtu_retry: RetryPolicy,
    pub vf_ready: RetryPolicy,
}

impl EngineContext {
    /// A context with the default retry policies and no initial state.
    #[must_use]
    pub fn new(cluster_type: ClusterType, udev: UdevRules, models: SupportedModels) -> Self {
        Self {
            cluster_type,
            initial_state: InitialNodeState::default(),
            udev,
            models,
            with_unsupported: false,
            mtu_retry: RetryPolicy::MTU_WRITE,
            vf_ready: RetryPolicy::VF_READY,
        }
    }

    #[must_use]
    pub fn with_initial_state(mut self, initial_state: InitialNodeState) -> Self {
        self.initial_state = initial_state;
        self
    }

    #[must_use]
    pub fn with_unsupported(mut self, with_unsupported: bool) -> Self {
        self.with_unsupported = with_unsupported;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{ClusterType, InitialNodeState};
    use config::PhysicalFunction;
    use hardware::pci::device::DeviceId;
    use hardware::pci::vendor::VendorId;

    #[test]
    fn cluster_type_names() {
        assert_eq!("openshift".parse::<ClusterType>().unwrap(), ClusterType::Openshift);
        assert_eq!(ClusterType::Kubernetes.to_string(), "kubernetes");
        assert!("nomad".parse::<ClusterType>().is_err());
    }

    #[test]
    fn initial_mtu() {
        let mut pf = PhysicalFunction::new(
            "0000:3b:00.0".parse().unwrap(),
            "ice",
            VendorId::INTEL,
            DeviceId::new(0x159b),
        );
        pf.mtu = 9000;
        let mut unknown = pf.clone();
        unknown.pci_address = "0000:3b:00.1".parse().unwrap();
        unknown.mtu = 0;
        let state = InitialNodeState::new(vec![pf, unknown]);
        assert_eq!(state.mtu(&"0000:3b:00.0".parse().unwrap()), Some(9000));
        assert_eq!(state.mtu(&"0000:3b:00.1".parse().unwrap()), None);
        assert_eq!(state.mtu(&"0000:3b:00.2".parse().unwrap()), None);
    }
}
