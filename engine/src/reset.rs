// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Returning a PF to a state without VFs.

use crate::context::EngineContext;
use crate::error::ResetError;
use crate::host::Host;
use crate::mtu::write_mtu;
use config::PhysicalFunction;
use hardware::link::LinkType;
use tracing::{debug, info};

/// Remove all VFs of `pf` and restore its MTU.
///
/// Ethernet PFs get the MTU they had when the agent started (1500 if unknown), InfiniBand
/// PFs get 2048.  The MTU of PFs with an unknown link type is left alone.
#[tracing::instrument(level = "info", skip_all, fields(pci = %pf.pci_address))]
pub async fn reset<H: Host>(
    host: &H,
    ctx: &EngineContext,
    pf: &PhysicalFunction,
) -> Result<(), ResetError> {
    let pci = pf.pci_address;
    host.write_num_vfs(&pci, 0)
        .await
        .map_err(|source| ResetError::NumVfs { pci, source })?;
    let mtu = match pf.link_type {
        LinkType::Ethernet => ctx
            .initial_state
            .mtu(&pci)
            .unwrap_or(LinkType::Ethernet.default_mtu()),
        LinkType::Infiniband => LinkType::Infiniband.default_mtu(),
        LinkType::Unknown => {
            debug!("unknown link type, leaving the MTU of {pci} alone");
            info!("removed all VFs of {pci}");
            return Ok(());
        }
    };
    write_mtu(host, &ctx.mtu_retry, pci, mtu)
        .await
        .map_err(|source| ResetError::Mtu { pci, mtu, source })?;
    info!("removed all VFs of {pci} and restored MTU {mtu}");
    Ok(())
}
