// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel-wide state: lockdown mode and the boot command line.

use crate::{Sysfs, SysfsError};

const LOCKDOWN: &str = "/sys/kernel/security/lockdown";
const CMDLINE: &str = "/proc/cmdline";

/// Kernel boot arguments relevant to SR-IOV.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum KernelArg {
    /// Lets the kernel re-assign PCI bridge windows so that VF BARs fit.
    #[strum(serialize = "pci=realloc")]
    PciRealloc,
    #[strum(serialize = "intel_iommu=on")]
    IntelIommu,
    #[strum(serialize = "iommu=pt")]
    IommuPassthrough,
}

pub const KNOWN_KERNEL_ARGS: [KernelArg; 3] = [
    KernelArg::PciRealloc,
    KernelArg::IntelIommu,
    KernelArg::IommuPassthrough,
];

impl Sysfs {
    /// True if the kernel runs in `integrity` or `confidentiality` lockdown mode.
    ///
    /// In lockdown the firmware tools used to reconfigure Mellanox NICs do not work.  A
    /// kernel without the lockdown LSM is reported as not locked down.
    pub async fn lockdown_active(&self) -> Result<bool, SysfsError> {
        match self.read_string(&self.path(LOCKDOWN)).await {
            Ok(mode) => Ok(mode.contains("[integrity]") || mode.contains("[confidentiality]")),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn kernel_cmdline(&self) -> Result<String, SysfsError> {
        self.read_string(&self.path(CMDLINE)).await
    }

    /// True if `arg` appears as a whole token on the kernel command line.
    pub async fn is_kernel_arg_set(&self, arg: KernelArg) -> Result<bool, SysfsError> {
        let wanted = arg.to_string();
        Ok(self
            .kernel_cmdline()
            .await?
            .split_whitespace()
            .any(|token| token == wanted))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::KernelArg;
    use crate::fixture::FakeSysfs;

    #[tokio::test]
    async fn lockdown_modes() {
        let fake = FakeSysfs::new();
        let sysfs = fake.sysfs();
        assert!(!sysfs.lockdown_active().await.unwrap());
        fake.write("sys/kernel/security/lockdown", "[none] integrity confidentiality\n");
        assert!(!sysfs.lockdown_active().await.unwrap());
        fake.write("sys/kernel/security/lockdown", "none [integrity] confidentiality\n");
        assert!(sysfs.lockdown_active().await.unwrap());
        fake.write("sys/kernel/security/lockdown", "none integrity [confidentiality]\n");
        assert!(sysfs.lockdown_active().await.unwrap());
    }

    #[tokio::test]
    async fn kernel_args_match_whole_tokens() {
        let fake = FakeSysfs::new();
        fake.write(
            "proc/cmdline",
            "BOOT_IMAGE=/vmlinuz root=/dev/sda1 intel_iommu=on iommu=ptx\n",
        );
        let sysfs = fake.sysfs();
        assert!(sysfs.is_kernel_arg_set(KernelArg::IntelIommu).await.unwrap());
        assert!(!sysfs.is_kernel_arg_set(KernelArg::IommuPassthrough).await.unwrap());
        assert!(!sysfs.is_kernel_arg_set(KernelArg::PciRealloc).await.unwrap());
    }

    #[tokio::test]
    async fn missing_cmdline_is_an_error() {
        let fake = FakeSysfs::new();
        assert!(fake
            .sysfs()
            .is_kernel_arg_set(KernelArg::PciRealloc)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
