// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel as seen by the engine.
//!
//! [`Host`] is the seam between policy (discovery, convergence decisions, orchestration) and
//! the kernel interfaces which carry it out.  [`LinuxHost`] implements it on top of sysfs,
//! rtnetlink and a couple of vendor command line tools.

use crate::bluefield::{BlueFieldError, BlueFieldMode, Mstconfig};
use hardware::driver::UserspaceDriver;
use hardware::hwaddr::{Guid, Mac};
use hardware::link::EswitchMode;
use hardware::pci::address::PciAddress;
use hardware::pci::class::PciClass;
use hardware::pci::device::DeviceId;
use hardware::pci::vendor::VendorId;
use interface_manager::{Devlink, DevlinkError, Link, Netlink, NetlinkError};
use sysfs::{KernelArg, Sysfs, SysfsError};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Sysfs(#[from] SysfsError),
    #[error(transparent)]
    Netlink(#[from] NetlinkError),
    #[error(transparent)]
    Devlink(#[from] DevlinkError),
    #[error(transparent)]
    BlueField(#[from] BlueFieldError),
}

impl HostError {
    /// True if the error means the object looked up does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            HostError::Sysfs(e) => e.is_not_found(),
            HostError::Netlink(NetlinkError::NotFound(_)) => true,
            _ => false,
        }
    }
}

/// Kernel operations needed to discover and configure SR-IOV devices.
#[allow(async_fn_in_trait)]
pub trait Host {
    async fn pci_devices(&self) -> Result<Vec<PciAddress>, HostError>;
    async fn pci_class(&self, pci: &PciAddress) -> Result<PciClass, HostError>;
    async fn pci_ids(&self, pci: &PciAddress) -> Result<(VendorId, DeviceId), HostError>;
    async fn is_vf(&self, pci: &PciAddress) -> bool;
    async fn driver(&self, pci: &PciAddress) -> Result<Option<String>, HostError>;
    async fn net_names(&self, pci: &PciAddress) -> Result<Vec<String>, HostError>;

    /// VF capacity of a PF, `None` if the function is not SR-IOV capable.
    async fn sriov_capacity(&self, pci: &PciAddress) -> Result<Option<u32>, HostError>;
    async fn num_vfs(&self, pci: &PciAddress) -> Result<u32, HostError>;
    async fn vf_list(&self, pf: &PciAddress) -> Result<Vec<(u32, PciAddress)>, HostError>;
    async fn eswitch_mode(&self, pci: &PciAddress) -> Result<Option<EswitchMode>, HostError>;
    async fn bluefield_mode(&self, pci: &PciAddress) -> Result<BlueFieldMode, HostError>;

    async fn mtu(&self, ifname: &str) -> Result<u32, HostError>;
    async fn mac(&self, ifname: &str) -> Result<String, HostError>;
    async fn speed(&self, ifname: &str) -> Result<Option<u32>, HostError>;
    async fn phys_switch_id(&self, ifname: &str) -> Result<Option<String>, HostError>;
    async fn phys_port_name(&self, ifname: &str) -> Result<String, HostError>;
    async fn link(&self, ifname: &str) -> Result<Link, HostError>;

    async fn write_num_vfs(&self, pci: &PciAddress, num_vfs: u32) -> Result<(), HostError>;
    async fn write_mtu(&self, ifname: &str, mtu: u32) -> Result<(), HostError>;
    async fn unbind(&self, pci: &PciAddress) -> Result<(), HostError>;
    async fn bind_default_driver(&self, pci: &PciAddress) -> Result<(), HostError>;
    async fn bind_driver(&self, pci: &PciAddress, driver: UserspaceDriver) -> Result<(), HostError>;
    async fn set_link_up(&self, link: &Link) -> Result<(), HostError>;
    async fn set_vf_mac(&self, pf: &Link, vf: u32, mac: Mac) -> Result<(), HostError>;
    async fn set_vf_guid(&self, pf: &Link, vf: u32, guid: Guid) -> Result<(), HostError>;

    async fn lockdown_active(&self) -> Result<bool, HostError>;
    async fn kernel_arg_set(&self, arg: KernelArg) -> Result<bool, HostError>;
}

/// The real host.
#[derive(Debug)]
pub struct LinuxHost {
    sysfs: Sysfs,
    netlink: Netlink,
    devlink: Devlink,
    mstconfig: Mstconfig,
}

impl LinuxHost {
    #[must_use]
    pub fn new(sysfs: Sysfs, netlink: Netlink) -> Self {
        Self {
            sysfs,
            netlink,
            devlink: Devlink::default(),
            mstconfig: Mstconfig::default(),
        }
    }

    #[must_use]
    pub fn sysfs(&self) -> &Sysfs {
        &self.sysfs
    }
}

impl Host for LinuxHost {
    async fn pci_devices(&self) -> Result<Vec<PciAddress>, HostError> {
        Ok(self.sysfs.pci_devices().await?)
    }

    async fn pci_class(&self, pci: &PciAddress) -> Result<PciClass, HostError> {
        Ok(self.sysfs.class(pci).await?)
    }

    async fn pci_ids(&self, pci: &PciAddress) -> Result<(VendorId, DeviceId), HostError> {
        Ok((self.sysfs.vendor(pci).await?, self.sysfs.device(pci).await?))
    }

    async fn is_vf(&self, pci: &PciAddress) -> bool {
        self.sysfs.is_vf(pci).await
    }

    async fn driver(&self, pci: &PciAddress) -> Result<Option<String>, HostError> {
        Ok(self.sysfs.driver(pci).await?)
    }

    async fn net_names(&self, pci: &PciAddress) -> Result<Vec<String>, HostError> {
        Ok(self.sysfs.net_names(pci).await?)
    }

    async fn sriov_capacity(&self, pci: &PciAddress) -> Result<Option<u32>, HostError> {
        match self.sysfs.total_vfs(pci).await {
            Ok(total) => Ok(Some(total)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn num_vfs(&self, pci: &PciAddress) -> Result<u32, HostError> {
        Ok(self.sysfs.num_vfs(pci).await?)
    }

    async fn vf_list(&self, pf: &PciAddress) -> Result<Vec<(u32, PciAddress)>, HostError> {
        Ok(self.sysfs.vf_list(pf).await?)
    }

    async fn eswitch_mode(&self, pci: &PciAddress) -> Result<Option<EswitchMode>, HostError> {
        Ok(self.devlink.eswitch_mode(*pci).await?)
    }

    async fn bluefield_mode(&self, pci: &PciAddress) -> Result<BlueFieldMode, HostError> {
        Ok(self.mstconfig.mode(*pci).await?)
    }

    async fn mtu(&self, ifname: &str) -> Result<u32, HostError> {
        Ok(self.sysfs.mtu(ifname).await?)
    }

    async fn mac(&self, ifname: &str) -> Result<String, HostError> {
        Ok(self.sysfs.mac(ifname).await?)
    }

    async fn speed(&self, ifname: &str) -> Result<Option<u32>, HostError> {
        Ok(self.sysfs.speed(ifname).await?)
    }

    async fn phys_switch_id(&self, ifname: &str) -> Result<Option<String>, HostError> {
        Ok(self.sysfs.phys_switch_id(ifname).await?)
    }

    async fn phys_port_name(&self, ifname: &str) -> Result<String, HostError> {
        Ok(self.sysfs.phys_port_name(ifname).await?)
    }

    async fn link(&self, ifname: &str) -> Result<Link, HostError> {
        Ok(self.netlink.link_by_name(ifname).await?)
    }

    async fn write_num_vfs(&self, pci: &PciAddress, num_vfs: u32) -> Result<(), HostError> {
        Ok(self.sysfs.write_num_vfs(pci, num_vfs).await?)
    }

    async fn write_mtu(&self, ifname: &str, mtu: u32) -> Result<(), HostError> {
        Ok(self.sysfs.write_mtu(ifname, mtu).await?)
    }

    async fn unbind(&self, pci: &PciAddress) -> Result<(), HostError> {
        Ok(self.sysfs.unbind(pci).await?)
    }

    async fn bind_default_driver(&self, pci: &PciAddress) -> Result<(), HostError> {
        Ok(self.sysfs.bind_default_driver(pci).await?)
    }

    async fn bind_driver(&self, pci: &PciAddress, driver: UserspaceDriver) -> Result<(), HostError> {
        Ok(self.sysfs.bind_driver(pci, driver.name()).await?)
    }

    async fn set_link_up(&self, link: &Link) -> Result<(), HostError> {
        Ok(self.netlink.set_link_up(link).await?)
    }

    async fn set_vf_mac(&self, pf: &Link, vf: u32, mac: Mac) -> Result<(), HostError> {
        Ok(self.netlink.set_vf_mac(pf, vf, mac).await?)
    }

    async fn set_vf_guid(&self, pf: &Link, vf: u32, guid: Guid) -> Result<(), HostError> {
        Ok(self.netlink.set_vf_guid(pf, vf, guid).await?)
    }

    async fn lockdown_active(&self) -> Result<bool, HostError> {
        Ok(self.sysfs.lockdown_active().await?)
    }

    async fn kernel_arg_set(&self, arg: KernelArg) -> Result<bool, HostError> {
        Ok(self.sysfs.is_kernel_arg_set(arg).await?)
    }
}
