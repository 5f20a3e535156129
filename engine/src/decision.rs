// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Whether a PF has to be reconfigured, and whether it must be left alone entirely.

use crate::bluefield::BlueFieldMode;
use crate::context::{ClusterType, EngineContext};
use crate::error::SyncError;
use crate::host::{Host, HostError};
use config::{DeviceType, InterfaceSpec, NodeSpec, PhysicalFunction};
use hardware::driver::UserspaceDriver;
use hardware::pci::address::PciAddress;
use hardware::pci::device::DeviceId;
use hardware::pci::vendor::VendorId;
use std::collections::BTreeMap;
use tracing::{debug, trace};

const BLUEFIELD_2: DeviceId = DeviceId::new(0xa2d6);
const BLUEFIELD_3: DeviceId = DeviceId::new(0xa2dc);

fn runs_userspace_driver(driver: Option<&str>) -> bool {
    driver.is_some_and(UserspaceDriver::is_userspace)
}

/// True if the observed state of a PF diverges from its desired state.
#[must_use]
pub fn needs_update(desired: &InterfaceSpec, observed: &PhysicalFunction) -> bool {
    let pci = desired.pci_address;
    if desired.mtu > 0 && desired.mtu != observed.mtu {
        debug!("{pci}: MTU {} wanted, {} found", desired.mtu, observed.mtu);
        return true;
    }
    if desired.num_vfs != observed.num_vfs {
        debug!(
            "{pci}: {} VFs wanted, {} found",
            desired.num_vfs, observed.num_vfs
        );
        return true;
    }
    if desired.num_vfs == 0 {
        return false;
    }
    for vf in &observed.vfs {
        let driver = vf.driver.as_deref();
        let Some(group) = desired.group_for(vf.vf_id) else {
            if runs_userspace_driver(driver) {
                debug!("{pci}: VF {} is in no group but runs {driver:?}", vf.vf_id);
                return true;
            }
            continue;
        };
        match group.device_type {
            DeviceType::Userspace(wanted) => {
                if driver != Some(wanted.name()) {
                    debug!(
                        "{pci}: VF {} runs {driver:?} instead of {wanted}",
                        vf.vf_id
                    );
                    return true;
                }
            }
            DeviceType::NetDevice => {
                if runs_userspace_driver(driver) {
                    debug!("{pci}: VF {} still runs {driver:?}", vf.vf_id);
                    return true;
                }
                if group.mtu > 0 && vf.mtu > 0 && group.mtu != vf.mtu {
                    debug!(
                        "{pci}: VF {} MTU {} wanted, {} found",
                        vf.vf_id, group.mtu, vf.mtu
                    );
                    return true;
                }
                if desired.externally_managed {
                    trace!("{pci}: externally managed VFs are always revisited");
                    return true;
                }
            }
        }
    }
    false
}

/// True if the PF must not be touched by this agent at all.
pub async fn should_skip<H: Host>(
    host: &H,
    cluster_type: ClusterType,
    desired: &InterfaceSpec,
    observed: &PhysicalFunction,
) -> Result<bool, HostError> {
    if desired.is_switchdev() {
        return Ok(true);
    }
    let bluefield = observed.vendor == VendorId::MELLANOX
        && (observed.device_id == BLUEFIELD_2 || observed.device_id == BLUEFIELD_3);
    if cluster_type != ClusterType::Openshift || !bluefield {
        return Ok(false);
    }
    match host.bluefield_mode(&observed.pci_address).await? {
        BlueFieldMode::Dpu => {
            debug!("{} is a BlueField in DPU mode", observed.pci_address);
            Ok(true)
        }
        BlueFieldMode::ConnectX => Ok(false),
    }
}

/// Evaluate [`should_skip`] for every observed PF with a desired state.
pub async fn pfs_to_skip<H: Host>(
    host: &H,
    ctx: &EngineContext,
    desired: &NodeSpec,
    observed: &[PhysicalFunction],
) -> Result<BTreeMap<PciAddress, bool>, SyncError> {
    let mut skip = BTreeMap::new();
    for pf in observed {
        let Some(spec) = desired.get(&pf.pci_address) else {
            continue;
        };
        let pci = pf.pci_address;
        let skipped = should_skip(host, ctx.cluster_type, spec, pf)
            .await
            .map_err(|source| SyncError::Skip { pci, source })?;
        skip.insert(pci, skipped);
    }
    Ok(skip)
}
