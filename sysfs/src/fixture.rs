// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A miniature sysfs tree in a temporary directory.

use crate::Sysfs;
use std::os::unix::fs::symlink;
use std::path::PathBuf;
use tempfile::TempDir;

pub(crate) struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/bus/pci/devices")).unwrap();
        Self { dir }
    }

    pub(crate) fn sysfs(&self) -> Sysfs {
        Sysfs::new(self.dir.path())
    }

    fn abs(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub(crate) fn write(&self, rel: &str, content: &str) {
        let path = self.abs(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub(crate) fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.abs(rel)).unwrap()
    }

    pub(crate) fn exists(&self, rel: &str) -> bool {
        self.abs(rel).exists()
    }

    pub(crate) fn driver_dir(&self, driver: &str) -> PathBuf {
        let dir = self.abs(&format!("sys/bus/pci/drivers/{driver}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub(crate) fn device(
        &self,
        addr: &str,
        class: &str,
        vendor: &str,
        device: &str,
        driver: Option<&str>,
    ) {
        let dev = format!("sys/bus/pci/devices/{addr}");
        self.write(&format!("{dev}/class"), &format!("{class}\n"));
        self.write(&format!("{dev}/vendor"), &format!("{vendor}\n"));
        self.write(&format!("{dev}/device"), &format!("{device}\n"));
        if let Some(driver) = driver {
            symlink(self.driver_dir(driver), self.abs(&format!("{dev}/driver"))).unwrap();
        }
    }

    pub(crate) fn netdev(&self, addr: &str, ifname: &str) {
        std::fs::create_dir_all(self.abs(&format!("sys/bus/pci/devices/{addr}/net/{ifname}")))
            .unwrap();
        self.netdev_attr(ifname, "mtu", "1500");
        self.netdev_attr(ifname, "address", "0c:42:a1:00:00:00");
    }

    pub(crate) fn netdev_attr(&self, ifname: &str, attr: &str, value: &str) {
        self.write(&format!("sys/class/net/{ifname}/{attr}"), &format!("{value}\n"));
    }

    pub(crate) fn pf(
        &self,
        addr: &str,
        vendor: &str,
        device: &str,
        driver: &str,
        ifname: &str,
        total_vfs: u32,
    ) {
        self.device(addr, "0x020000", vendor, device, Some(driver));
        let dev = format!("sys/bus/pci/devices/{addr}");
        self.write(&format!("{dev}/sriov_totalvfs"), &format!("{total_vfs}\n"));
        self.write(&format!("{dev}/sriov_numvfs"), "0\n");
        self.netdev(addr, ifname);
    }

    pub(crate) fn vf(&self, pf: &str, index: u32, addr: &str, driver: &str, ifname: Option<&str>) {
        let vendor = self.read(&format!("sys/bus/pci/devices/{pf}/vendor"));
        self.device(addr, "0x020000", vendor.trim(), "0x154c", Some(driver));
        let devices = self.abs("sys/bus/pci/devices");
        symlink(devices.join(pf), devices.join(addr).join("physfn")).unwrap();
        symlink(devices.join(addr), devices.join(pf).join(format!("virtfn{index}"))).unwrap();
        if let Some(ifname) = ifname {
            self.netdev(addr, ifname);
        }
    }
}
