// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `/sys/bus/pci/devices/<addr>` attributes.

use crate::{Sysfs, SysfsError};
use hardware::pci::address::PciAddress;
use hardware::pci::class::PciClass;
use hardware::pci::device::DeviceId;
use hardware::pci::vendor::VendorId;
use std::path::PathBuf;
use tracing::{debug, warn};

const PCI_DEVICES: &str = "/sys/bus/pci/devices";
const VIRTFN_PREFIX: &str = "virtfn";

impl Sysfs {
    pub(crate) fn pci_device_dir(&self, addr: &PciAddress) -> PathBuf {
        self.path(PCI_DEVICES).join(addr.to_string())
    }

    /// Enumerate every function on the PCI bus in address order.
    ///
    /// Directory entries which are not PCI addresses are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Fails if the PCI device directory cannot be read or contains no devices.
    pub async fn pci_devices(&self) -> Result<Vec<PciAddress>, SysfsError> {
        let dir = self.path(PCI_DEVICES);
        let mut addrs = Vec::new();
        for name in self.list_dir(&dir).await? {
            match name.parse::<PciAddress>() {
                Ok(addr) => addrs.push(addr),
                Err(e) => warn!("ignoring {name} in {}: {e}", dir.display()),
            }
        }
        if addrs.is_empty() {
            return Err(SysfsError::NoDevices(dir));
        }
        addrs.sort();
        Ok(addrs)
    }

    pub async fn class(&self, addr: &PciAddress) -> Result<PciClass, SysfsError> {
        let path = self.pci_device_dir(addr).join("class");
        let content = self.read_string(&path).await?;
        PciClass::try_from(content.as_str()).map_err(|_| SysfsError::Parse { path, content })
    }

    pub async fn vendor(&self, addr: &PciAddress) -> Result<VendorId, SysfsError> {
        let path = self.pci_device_dir(addr).join("vendor");
        let content = self.read_string(&path).await?;
        VendorId::try_from(content.as_str()).map_err(|_| SysfsError::Parse { path, content })
    }

    pub async fn device(&self, addr: &PciAddress) -> Result<DeviceId, SysfsError> {
        let path = self.pci_device_dir(addr).join("device");
        let content = self.read_string(&path).await?;
        DeviceId::try_from(content.as_str()).map_err(|_| SysfsError::Parse { path, content })
    }

    /// True if the function is a virtual function (it has a `physfn` link).
    pub async fn is_vf(&self, addr: &PciAddress) -> bool {
        tokio::fs::symlink_metadata(self.pci_device_dir(addr).join("physfn"))
            .await
            .is_ok()
    }

    /// The name of the driver currently bound to the function, if any.
    pub async fn driver(&self, addr: &PciAddress) -> Result<Option<String>, SysfsError> {
        self.read_link_name(&self.pci_device_dir(addr).join("driver"))
            .await
    }

    /// The names of the netdevs backed by the function, sorted.  Empty if there are none.
    pub async fn net_names(&self, addr: &PciAddress) -> Result<Vec<String>, SysfsError> {
        match self.list_dir(&self.pci_device_dir(addr).join("net")).await {
            Err(e) if e.is_not_found() => Ok(vec![]),
            other => other,
        }
    }

    pub async fn total_vfs(&self, addr: &PciAddress) -> Result<u32, SysfsError> {
        self.read_parsed(&self.pci_device_dir(addr).join("sriov_totalvfs"))
            .await
    }

    pub async fn num_vfs(&self, addr: &PciAddress) -> Result<u32, SysfsError> {
        self.read_parsed(&self.pci_device_dir(addr).join("sriov_numvfs"))
            .await
    }

    /// Set the number of VFs of a PF.
    ///
    /// Drivers refuse to change a nonzero VF count directly, so the count is first reset to
    /// zero and then set to the requested value.
    #[tracing::instrument(level = "debug", skip(self), fields(pf = %addr))]
    pub async fn write_num_vfs(&self, addr: &PciAddress, num_vfs: u32) -> Result<(), SysfsError> {
        let path = self.pci_device_dir(addr).join("sriov_numvfs");
        self.write_string(&path, "0").await?;
        if num_vfs > 0 {
            self.write_string(&path, &num_vfs.to_string()).await?;
        }
        debug!("set {num_vfs} VFs on {addr}");
        Ok(())
    }

    /// The provisioned VFs of a PF as `(index, address)` pairs, ordered by index.
    pub async fn vf_list(&self, pf: &PciAddress) -> Result<Vec<(u32, PciAddress)>, SysfsError> {
        let dir = self.pci_device_dir(pf);
        let mut vfs = Vec::new();
        for name in self.list_dir(&dir).await? {
            let Some(index) = name
                .strip_prefix(VIRTFN_PREFIX)
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            let link = dir.join(&name);
            let Some(target) = self.read_link_name(&link).await? else {
                continue;
            };
            let addr = target
                .parse::<PciAddress>()
                .map_err(|_| SysfsError::Parse {
                    path: link,
                    content: target,
                })?;
            vfs.push((index, addr));
        }
        vfs.sort_by_key(|(index, _)| *index);
        Ok(vfs)
    }

    /// The index of `vf` among the VFs of `pf`, if it is one of them.
    pub async fn vf_index(&self, pf: &PciAddress, vf: &PciAddress) -> Result<Option<u32>, SysfsError> {
        Ok(self
            .vf_list(pf)
            .await?
            .into_iter()
            .find_map(|(index, addr)| (addr == *vf).then_some(index)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use crate::fixture::FakeSysfs;
    use crate::SysfsError;
    use hardware::pci::address::PciAddress;
    use hardware::pci::vendor::VendorId;
    use pretty_assertions::assert_eq;

    fn addr(s: &str) -> PciAddress {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn enumerates_and_classifies() {
        let fake = FakeSysfs::new();
        fake.pf("0000:3b:00.0", "0x15b3", "0x101d", "mlx5_core", "ens1f0", 8);
        fake.vf("0000:3b:00.0", 0, "0000:3b:00.2", "mlx5_core", Some("ens1f0v0"));
        fake.device("0000:00:1f.6", "0x010802", "0x8086", "0x1234", None);
        let sysfs = fake.sysfs();

        let devices = sysfs.pci_devices().await.unwrap();
        assert_eq!(
            devices,
            vec![addr("0000:00:1f.6"), addr("0000:3b:00.0"), addr("0000:3b:00.2")]
        );
        let pf = addr("0000:3b:00.0");
        assert!(sysfs.class(&pf).await.unwrap().is_network());
        assert_eq!(sysfs.vendor(&pf).await.unwrap(), VendorId::MELLANOX);
        assert!(!sysfs.is_vf(&pf).await);
        assert!(sysfs.is_vf(&addr("0000:3b:00.2")).await);
        assert_eq!(sysfs.driver(&pf).await.unwrap().as_deref(), Some("mlx5_core"));
        assert_eq!(sysfs.driver(&addr("0000:00:1f.6")).await.unwrap(), None);
        assert_eq!(sysfs.net_names(&pf).await.unwrap(), vec!["ens1f0".to_string()]);
        assert!(sysfs.net_names(&addr("0000:00:1f.6")).await.unwrap().is_empty());
        assert_eq!(sysfs.total_vfs(&pf).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn empty_bus_is_an_error() {
        let fake = FakeSysfs::new();
        let err = fake.sysfs().pci_devices().await.unwrap_err();
        assert!(matches!(err, SysfsError::NoDevices(_)));
    }

    #[tokio::test]
    async fn missing_bus_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = crate::Sysfs::new(dir.path()).pci_devices().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn vf_list_is_ordered_by_index() {
        let fake = FakeSysfs::new();
        fake.pf("0000:3b:00.0", "0x8086", "0x158b", "i40e", "ens2f0", 16);
        for (idx, vf) in [(10, "0000:3b:0a.0"), (2, "0000:3b:02.0"), (0, "0000:3b:00.4")] {
            fake.vf("0000:3b:00.0", idx, vf, "iavf", None);
        }
        let sysfs = fake.sysfs();
        let pf = addr("0000:3b:00.0");
        let vfs = sysfs.vf_list(&pf).await.unwrap();
        let indices: Vec<u32> = vfs.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2, 10]);
        assert_eq!(sysfs.vf_index(&pf, &addr("0000:3b:02.0")).await.unwrap(), Some(2));
        assert_eq!(sysfs.vf_index(&pf, &addr("0000:3b:07.0")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn num_vfs_write_resets_first() {
        let fake = FakeSysfs::new();
        fake.pf("0000:3b:00.0", "0x8086", "0x158b", "i40e", "ens2f0", 16);
        let sysfs = fake.sysfs();
        let pf = addr("0000:3b:00.0");
        sysfs.write_num_vfs(&pf, 4).await.unwrap();
        assert_eq!(sysfs.num_vfs(&pf).await.unwrap(), 4);
        sysfs.write_num_vfs(&pf, 0).await.unwrap();
        assert_eq!(sysfs.num_vfs(&pf).await.unwrap(), 0);
    }
}
