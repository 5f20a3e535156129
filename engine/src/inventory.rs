// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Discovery of SR-IOV physical functions and their provisioned VFs.

use crate::context::EngineContext;
use crate::error::DiscoveryError;
use crate::host::Host;
use crate::store::PfStatusStore;
use config::{PhysicalFunction, VirtualFunction};
use hardware::pci::address::PciAddress;
use tracing::{debug, trace, warn};

/// True if `name` looks like the uplink port name of a switchdev PF (`p0`, `p1`, ...).
fn is_pf_port_name(name: &str) -> bool {
    name.strip_prefix('p')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// The network interface name of `pci`.
///
/// In switchdev mode the PF and the representors of its VFs share a PCI address; the PF is
/// the name which belongs to a switch and whose port name, when readable, is `p<n>`.
/// Otherwise the first name is used.
pub async fn resolve_interface_name<H: Host>(host: &H, pci: &PciAddress) -> Option<String> {
    let names = match host.net_names(pci).await {
        Ok(names) => names,
        Err(e) => {
            trace!("no interface names for {pci}: {e}");
            return None;
        }
    };
    for name in &names {
        match host.phys_switch_id(name).await {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => continue,
        }
        if let Ok(port) = host.phys_port_name(name).await
            && !is_pf_port_name(&port)
        {
            continue;
        }
        return Some(name.clone());
    }
    names.into_iter().next()
}

/// Fill the netdev backed fields of a function, leaving unknown values at their defaults.
async fn netdev_details<H: Host>(host: &H, ifname: &str) -> (u32, Option<String>) {
    let mtu = host.mtu(ifname).await.unwrap_or_else(|e| {
        debug!("cannot read MTU of {ifname}: {e}");
        0
    });
    let mac = host.mac(ifname).await.ok();
    (mtu, mac)
}

async fn virtual_function<H: Host>(host: &H, vf_id: u32, pci: PciAddress) -> VirtualFunction {
    let mut vf = VirtualFunction::new(pci, vf_id);
    vf.driver = host.driver(&pci).await.ok().flatten();
    if let Ok((vendor, device)) = host.pci_ids(&pci).await {
        vf.vendor = Some(vendor);
        vf.device_id = Some(device);
    }
    if let Some(name) = resolve_interface_name(host, &pci).await {
        (vf.mtu, vf.mac) = netdev_details(host, &name).await;
        vf.name = Some(name);
    }
    vf
}

/// Inspect one PCI function.  `None` means it is not a PF we report.
async fn physical_function<H: Host, S: PfStatusStore>(
    host: &H,
    store: &S,
    ctx: &EngineContext,
    pci: PciAddress,
) -> Option<PhysicalFunction> {
    let class = match host.pci_class(&pci).await {
        Ok(class) => class,
        Err(e) => {
            warn!("skipping {pci}: cannot read device class: {e}");
            return None;
        }
    };
    if !class.is_network() || host.is_vf(&pci).await {
        return None;
    }
    let (vendor, device) = match host.pci_ids(&pci).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("skipping {pci}: cannot read vendor and device ids: {e}");
            return None;
        }
    };
    if !ctx.with_unsupported && !ctx.models.is_supported(vendor, device) {
        trace!("skipping unsupported device {pci} ({vendor}:{device})");
        return None;
    }
    let Ok(Some(driver)) = host.driver(&pci).await else {
        debug!("skipping {pci}: no driver bound");
        return None;
    };
    let Some(name) = resolve_interface_name(host, &pci).await else {
        debug!("skipping {pci}: no network interface");
        return None;
    };

    let mut pf = PhysicalFunction::new(pci, driver, vendor, device);
    (pf.mtu, pf.mac) = netdev_details(host, &name).await;
    pf.link_speed = match host.speed(&name).await {
        Ok(Some(speed)) => Some(format!("{speed} Mb/s")),
        _ => None,
    };
    pf.link_type = match host.link(&name).await {
        Ok(link) => link.link_type,
        Err(e) => {
            debug!("cannot read link type of {name}: {e}");
            pf.link_type
        }
    };
    pf.name = Some(name);
    match store.load(&pci).await {
        Ok(Some(record)) => pf.externally_managed = record.externally_managed,
        Ok(None) => {}
        Err(e) => warn!("cannot read stored state of {pci}: {e}"),
    }

    let capacity = match host.sriov_capacity(&pci).await {
        Ok(capacity) => capacity,
        Err(e) => {
            warn!("cannot read VF capacity of {pci}: {e}");
            None
        }
    };
    let Some(total_vfs) = capacity else {
        return Some(pf);
    };
    pf.total_vfs = total_vfs;
    pf.num_vfs = host.num_vfs(&pci).await.unwrap_or_else(|e| {
        warn!("cannot read VF count of {pci}: {e}");
        0
    });
    pf.eswitch_mode = host.eswitch_mode(&pci).await.unwrap_or_else(|e| {
        warn!("cannot read eswitch mode of {pci}: {e}");
        None
    });
    if pf.num_vfs == 0 {
        return Some(pf);
    }
    let vfs = match host.vf_list(&pci).await {
        Ok(vfs) => vfs,
        Err(e) => {
            warn!("dropping {pci} from discovery: cannot list its VFs: {e}");
            return None;
        }
    };
    for (vf_id, vf_pci) in vfs {
        pf.vfs.push(virtual_function(host, vf_id, vf_pci).await);
    }
    Some(pf)
}

/// Snapshot every supported SR-IOV PF of the host, in bus order.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn discover<H: Host, S: PfStatusStore>(
    host: &H,
    store: &S,
    ctx: &EngineContext,
) -> Result<Vec<PhysicalFunction>, DiscoveryError> {
    let devices = host
        .pci_devices()
        .await
        .map_err(DiscoveryError::Enumerate)?;
    let mut pfs = Vec::new();
    for pci in devices {
        if let Some(pf) = physical_function(host, store, ctx, pci).await {
            debug!(
                "found {pci} ({}) with {}/{} VFs",
                pf.name.as_deref().unwrap_or_default(),
                pf.num_vfs,
                pf.total_vfs
            );
            pfs.push(pf);
        }
    }
    Ok(pfs)
}
