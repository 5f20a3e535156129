// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Driving the host from its observed state towards the desired one.

use crate::context::EngineContext;
use crate::decision::{needs_update, pfs_to_skip};
use crate::error::{ApplyError, DiscoveryError, Stage, SyncError};
use crate::guid::random_guid;
use crate::host::Host;
use crate::inventory::{discover, resolve_interface_name};
use crate::mtu::write_mtu;
use crate::reset::reset;
use crate::store::PfStatusStore;
use config::{InterfaceSpec, NodeSpec, PhysicalFunction};
use hardware::driver::UserspaceDriver;
use hardware::hwaddr::Mac;
use hardware::link::LinkType;
use hardware::pci::address::PciAddress;
use hardware::pci::vendor::VendorId;
use interface_manager::Link;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Reconciles the SR-IOV state of a host against a [`NodeSpec`].
///
/// Passes must not overlap; the reconciler is the single writer of the host's VF
/// configuration, of the udev rules directory and of the store.
#[derive(Debug)]
pub struct Reconciler<H: Host, S: PfStatusStore> {
    host: H,
    store: S,
    ctx: EngineContext,
}

impl<H: Host, S: PfStatusStore> Reconciler<H, S> {
    pub fn new(host: H, store: S, ctx: EngineContext) -> Self {
        Self { host, store, ctx }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.ctx
    }

    /// Snapshot the SR-IOV PFs of the host.
    pub async fn discover(&self) -> Result<Vec<PhysicalFunction>, DiscoveryError> {
        discover(&self.host, &self.store, &self.ctx).await
    }

    /// Discover, decide which PFs to leave alone and sync.  Returns the snapshot the pass
    /// worked from.
    pub async fn pass(&self, desired: &NodeSpec) -> Result<Vec<PhysicalFunction>, SyncError> {
        let observed = self.discover().await?;
        let skip = pfs_to_skip(&self.host, &self.ctx, desired, &observed).await?;
        self.sync(desired, &observed, &skip).await?;
        Ok(observed)
    }

    /// Bring every observed PF in line with `desired`.
    ///
    /// PFs with a desired state are configured unless `skip` says otherwise.  PFs without
    /// one are reset if we provisioned their VFs in an earlier pass.  The pass stops at the
    /// first PF which cannot be configured.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn sync(
        &self,
        desired: &NodeSpec,
        observed: &[PhysicalFunction],
        skip: &BTreeMap<PciAddress, bool>,
    ) -> Result<(), SyncError> {
        self.check_lockdown(desired, observed).await?;
        for pf in observed {
            let pci = pf.pci_address;
            let skipped = skip.get(&pci).copied().unwrap_or(false);
            match desired.get(&pci) {
                Some(_) if skipped => debug!("skipping {pci}"),
                Some(spec) => self.sync_configured(spec, pf).await?,
                None if pf.num_vfs > 0 && !skipped => self.sync_unconfigured(pf).await?,
                None => {}
            }
        }
        Ok(())
    }

    async fn check_lockdown(
        &self,
        desired: &NodeSpec,
        observed: &[PhysicalFunction],
    ) -> Result<(), SyncError> {
        let locked = match self.host.lockdown_active().await {
            Ok(locked) => locked,
            Err(e) => {
                warn!("cannot read the kernel lockdown state, assuming unlocked: {e}");
                false
            }
        };
        if !locked {
            return Ok(());
        }
        let mellanox = observed
            .iter()
            .find(|pf| pf.vendor == VendorId::MELLANOX && desired.get(&pf.pci_address).is_some());
        match mellanox {
            Some(pf) => {
                warn!("Mellanox devices cannot be configured while the kernel is locked down");
                Err(SyncError::Lockdown {
                    pci: pf.pci_address,
                })
            }
            None => Ok(()),
        }
    }

    async fn save(&self, spec: &InterfaceSpec) -> Result<(), SyncError> {
        self.store
            .save_applied(spec)
            .await
            .map_err(|source| SyncError::StoreSave {
                pci: spec.pci_address,
                source,
            })
    }

    async fn sync_configured(
        &self,
        spec: &InterfaceSpec,
        pf: &PhysicalFunction,
    ) -> Result<(), SyncError> {
        let pci = pf.pci_address;
        if !needs_update(spec, pf) {
            debug!("{pci} is up to date");
            return self.save(spec).await;
        }
        if let Err(source) = self.apply(spec, pf).await {
            error!("failed to configure {pci}: {source}");
            if spec.externally_managed {
                info!("not resetting externally managed {pci}");
            } else if source.stage() == Stage::Validation {
                debug!("{pci} was not touched, nothing to reset");
            } else if let Err(e) = reset(&self.host, &self.ctx, pf).await {
                error!("failed to reset {pci} after a configuration error: {e}");
            }
            return Err(SyncError::Apply { pci, source });
        }
        self.save(spec).await
    }

    async fn sync_unconfigured(&self, pf: &PhysicalFunction) -> Result<(), SyncError> {
        let pci = pf.pci_address;
        let record = match self.store.load(&pci).await {
            Ok(record) => record,
            Err(e) => {
                warn!("cannot read stored state of {pci}, treating it as unknown: {e}");
                None
            }
        };
        let Some(record) = record else {
            info!("VFs of {pci} were not created by us, leaving them alone");
            return Ok(());
        };
        if record.externally_managed {
            info!("VFs of {pci} are externally managed, leaving them alone");
            return Ok(());
        }
        self.ctx
            .udev
            .remove(&pci)
            .await
            .map_err(|source| SyncError::Udev { pci, source })?;
        reset(&self.host, &self.ctx, pf).await?;
        Ok(())
    }

    /// Configure one PF according to `desired`, starting from `observed`.
    #[tracing::instrument(level = "info", skip_all, fields(pci = %desired.pci_address))]
    pub async fn apply(
        &self,
        desired: &InterfaceSpec,
        observed: &PhysicalFunction,
    ) -> Result<(), ApplyError> {
        let pci = desired.pci_address;
        if desired.num_vfs > observed.total_vfs {
            return Err(ApplyError::ExceedsCapacity {
                pci,
                requested: desired.num_vfs,
                capacity: observed.total_vfs,
            });
        }
        if desired.num_vfs != observed.num_vfs {
            self.set_num_vfs(desired, observed).await?;
        }
        if desired.mtu > 0 && desired.mtu > observed.mtu {
            write_mtu(&self.host, &self.ctx.mtu_retry, pci, desired.mtu)
                .await
                .map_err(|source| ApplyError::Mtu {
                    pci,
                    mtu: desired.mtu,
                    source,
                })?;
        }
        if desired.num_vfs > 0 {
            self.configure_vfs(desired, observed).await?;
        }
        let link = self.pf_link(observed).await?;
        if !link.oper_up {
            self.host
                .set_link_up(&link)
                .await
                .map_err(ApplyError::host(pci, "set link up"))?;
        }
        info!("configured {pci} with {} VFs", desired.num_vfs);
        Ok(())
    }

    async fn set_num_vfs(
        &self,
        desired: &InterfaceSpec,
        observed: &PhysicalFunction,
    ) -> Result<(), ApplyError> {
        let pci = desired.pci_address;
        if desired.externally_managed {
            if desired.num_vfs > observed.num_vfs {
                return Err(ApplyError::ExternallyManagedIncrease {
                    pci,
                    requested: desired.num_vfs,
                    current: observed.num_vfs,
                });
            }
            debug!(
                "{pci} is externally managed, keeping its {} VFs",
                observed.num_vfs
            );
            return Ok(());
        }
        let rule = self
            .ctx
            .udev
            .add(&pci)
            .await
            .map_err(|source| ApplyError::Udev { pci, source })?;
        match self.host.write_num_vfs(&pci, desired.num_vfs).await {
            Ok(()) => {
                rule.commit();
                Ok(())
            }
            Err(source) => {
                rule.rollback()
                    .await
                    .map_err(|source| ApplyError::Udev { pci, source })?;
                Err(ApplyError::Host {
                    pci,
                    op: "set VF count",
                    source,
                })
            }
        }
    }

    async fn pf_link(&self, observed: &PhysicalFunction) -> Result<Link, ApplyError> {
        let pci = observed.pci_address;
        let name = observed
            .name
            .as_deref()
            .ok_or(ApplyError::NoInterface { pci })?;
        self.host
            .link(name)
            .await
            .map_err(ApplyError::host(pci, "look up PF link"))
    }

    async fn configure_vfs(
        &self,
        desired: &InterfaceSpec,
        observed: &PhysicalFunction,
    ) -> Result<(), ApplyError> {
        let pci = desired.pci_address;
        let vfs = self
            .host
            .vf_list(&pci)
            .await
            .map_err(ApplyError::host(pci, "list VFs"))?;
        let pf_link = self.pf_link(observed).await?;
        let link_type = desired.link_type.unwrap_or(observed.link_type);
        for (vf_id, vf) in vfs {
            let group = desired.group_for(vf_id);
            let driver = self
                .host
                .driver(&vf)
                .await
                .map_err(ApplyError::host(vf, "read VF driver"))?;
            if driver
                .as_deref()
                .is_some_and(|d| !UserspaceDriver::is_userspace(d))
            {
                // addresses are assigned while the VF still has a kernel netdev
                if link_type == LinkType::Infiniband {
                    self.assign_guid(&pf_link, vf_id, vf).await?;
                } else {
                    self.assign_mac(&pf_link, vf_id, vf).await?;
                }
            }
            if group.is_some_and(|g| g.is_rdma) {
                self.host
                    .unbind(&vf)
                    .await
                    .map_err(ApplyError::host(vf, "unbind RDMA VF"))?;
            }
            match group.and_then(|g| g.device_type.userspace_driver()) {
                Some(userspace) => self
                    .host
                    .bind_driver(&vf, userspace)
                    .await
                    .map_err(ApplyError::host(vf, "bind userspace driver"))?,
                None => {
                    self.host
                        .bind_default_driver(&vf)
                        .await
                        .map_err(ApplyError::host(vf, "bind default driver"))?;
                    let mtu = group.map_or(0, |g| g.mtu);
                    if mtu > 0 {
                        write_mtu(&self.host, &self.ctx.mtu_retry, vf, mtu)
                            .await
                            .map_err(|source| ApplyError::Mtu {
                                pci: vf,
                                mtu,
                                source,
                            })?;
                    }
                }
            }
            debug!("configured VF {vf_id} ({vf}) of {pci}");
        }
        Ok(())
    }

    async fn assign_guid(&self, pf_link: &Link, vf_id: u32, vf: PciAddress) -> Result<(), ApplyError> {
        let guid = random_guid();
        self.host
            .set_vf_guid(pf_link, vf_id, guid)
            .await
            .map_err(ApplyError::host(vf, "set VF GUID"))?;
        debug!("assigned GUID {guid} to VF {vf_id} of {}", pf_link.name);
        // the GUID takes effect when the VF is bound again
        self.host
            .unbind(&vf)
            .await
            .map_err(ApplyError::host(vf, "unbind VF"))
    }

    async fn assign_mac(&self, pf_link: &Link, vf_id: u32, vf: PciAddress) -> Result<(), ApplyError> {
        let vf_link = self.vf_link(vf_id, vf).await?;
        let mac = <[u8; 6]>::try_from(vf_link.address.as_slice())
            .map(Mac::from)
            .map_err(|_| ApplyError::VfAddress { pci: vf, vf_id })?;
        self.host
            .set_vf_mac(pf_link, vf_id, mac)
            .await
            .map_err(ApplyError::host(vf, "set VF MAC"))
    }

    async fn vf_netdev_ready(&self, vf: PciAddress) -> bool {
        let host = &self.host;
        self.ctx
            .vf_ready
            .poll(format!("netdev of VF {vf}"), || async move {
                resolve_interface_name(host, &vf).await.is_some()
            })
            .await
    }

    /// Wait for the netdev of a fresh VF.  A VF whose netdev does not show up is rebound to
    /// its default driver once.
    async fn vf_link(&self, vf_id: u32, vf: PciAddress) -> Result<Link, ApplyError> {
        if !self.vf_netdev_ready(vf).await {
            warn!("netdev of VF {vf} did not appear, rebinding it");
            self.host
                .unbind(&vf)
                .await
                .map_err(ApplyError::host(vf, "unbind VF"))?;
            self.host
                .bind_default_driver(&vf)
                .await
                .map_err(ApplyError::host(vf, "bind default driver"))?;
            if !self.vf_netdev_ready(vf).await {
                return Err(ApplyError::VfNotReady { pci: vf, vf_id });
            }
        }
        let name = resolve_interface_name(&self.host, &vf)
            .await
            .ok_or(ApplyError::VfNotReady { pci: vf, vf_id })?;
        self.host
            .link(&name)
            .await
            .map_err(ApplyError::host(vf, "look up VF link"))
    }
}
