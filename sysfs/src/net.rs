// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `/sys/class/net/<ifname>` attributes.

use crate::{Sysfs, SysfsError};
use std::path::PathBuf;
use tracing::debug;

const CLASS_NET: &str = "/sys/class/net";

impl Sysfs {
    fn netdev_dir(&self, ifname: &str) -> PathBuf {
        self.path(CLASS_NET).join(ifname)
    }

    /// True if a netdev with this name exists.
    pub async fn netdev_exists(&self, ifname: &str) -> bool {
        tokio::fs::symlink_metadata(self.netdev_dir(ifname))
            .await
            .is_ok()
    }

    pub async fn mtu(&self, ifname: &str) -> Result<u32, SysfsError> {
        self.read_parsed(&self.netdev_dir(ifname).join("mtu")).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn write_mtu(&self, ifname: &str, mtu: u32) -> Result<(), SysfsError> {
        self.write_string(&self.netdev_dir(ifname).join("mtu"), &mtu.to_string())
            .await?;
        debug!("set mtu of {ifname} to {mtu}");
        Ok(())
    }

    /// The hardware address of the netdev, in the kernel's `aa:bb:...` notation.
    pub async fn mac(&self, ifname: &str) -> Result<String, SysfsError> {
        self.read_string(&self.netdev_dir(ifname).join("address"))
            .await
    }

    /// Link speed in Mb/s, or `None` if the link is down or the speed is unknown.
    pub async fn speed(&self, ifname: &str) -> Result<Option<u32>, SysfsError> {
        let speed: i64 = self
            .read_parsed(&self.netdev_dir(ifname).join("speed"))
            .await?;
        Ok(u32::try_from(speed).ok().filter(|s| *s > 0))
    }

    /// The id of the switch the netdev is a port of.  Only switchdev representors and
    /// uplinks have one; an empty file is reported as `None`.
    pub async fn phys_switch_id(&self, ifname: &str) -> Result<Option<String>, SysfsError> {
        let id = self
            .read_string(&self.netdev_dir(ifname).join("phys_switch_id"))
            .await?;
        Ok((!id.is_empty()).then_some(id))
    }

    pub async fn phys_port_name(&self, ifname: &str) -> Result<String, SysfsError> {
        self.read_string(&self.netdev_dir(ifname).join("phys_port_name"))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use crate::fixture::FakeSysfs;

    #[tokio::test]
    async fn netdev_attributes() {
        let fake = FakeSysfs::new();
        fake.pf("0000:3b:00.0", "0x15b3", "0x101d", "mlx5_core", "ens1f0", 8);
        fake.netdev_attr("ens1f0", "speed", "25000");
        let sysfs = fake.sysfs();
        assert!(sysfs.netdev_exists("ens1f0").await);
        assert!(!sysfs.netdev_exists("ens9").await);
        assert_eq!(sysfs.mtu("ens1f0").await.unwrap(), 1500);
        assert_eq!(sysfs.speed("ens1f0").await.unwrap(), Some(25000));
        assert_eq!(sysfs.mac("ens1f0").await.unwrap(), "0c:42:a1:00:00:00");

        sysfs.write_mtu("ens1f0", 9000).await.unwrap();
        assert_eq!(sysfs.mtu("ens1f0").await.unwrap(), 9000);
    }

    #[tokio::test]
    async fn unknown_speed_is_none() {
        let fake = FakeSysfs::new();
        fake.pf("0000:3b:00.0", "0x15b3", "0x101d", "mlx5_core", "ens1f0", 8);
        fake.netdev_attr("ens1f0", "speed", "-1");
        assert_eq!(fake.sysfs().speed("ens1f0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn switch_identity() {
        let fake = FakeSysfs::new();
        fake.pf("0000:3b:00.0", "0x15b3", "0x101d", "mlx5_core", "ens1f0", 8);
        fake.netdev_attr("ens1f0", "phys_switch_id", "");
        let sysfs = fake.sysfs();
        assert_eq!(sysfs.phys_switch_id("ens1f0").await.unwrap(), None);
        fake.netdev_attr("ens1f0", "phys_switch_id", "c0ffee");
        fake.netdev_attr("ens1f0", "phys_port_name", "p0");
        assert_eq!(
            sysfs.phys_switch_id("ens1f0").await.unwrap().as_deref(),
            Some("c0ffee")
        );
        assert_eq!(sysfs.phys_port_name("ens1f0").await.unwrap(), "p0");
        assert!(sysfs.phys_port_name("ens9").await.unwrap_err().is_not_found());
    }
}
