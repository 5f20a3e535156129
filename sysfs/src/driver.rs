// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Binding PCI functions to drivers.

use crate::{Sysfs, SysfsError};
use hardware::driver::UserspaceDriver;
use hardware::pci::address::PciAddress;
use std::path::PathBuf;
use tracing::{debug, warn};

const PCI_DRIVERS: &str = "/sys/bus/pci/drivers";
const DRIVERS_PROBE: &str = "/sys/bus/pci/drivers_probe";

impl Sysfs {
    fn pci_driver_dir(&self, driver: &str) -> PathBuf {
        self.path(PCI_DRIVERS).join(driver)
    }

    /// Detach the function from its driver.  Does nothing if no driver is bound.
    #[tracing::instrument(level = "debug", skip(self), fields(pci = %addr))]
    pub async fn unbind(&self, addr: &PciAddress) -> Result<(), SysfsError> {
        let Some(driver) = self.driver(addr).await? else {
            debug!("{addr} is not bound to any driver");
            return Ok(());
        };
        self.write_string(
            &self.pci_driver_dir(&driver).join("unbind"),
            &addr.to_string(),
        )
        .await?;
        debug!("unbound {addr} from {driver}");
        Ok(())
    }

    /// Hand the function back to the kernel's default driver.
    ///
    /// Functions already bound to a kernel (non userspace) driver are left alone.  Otherwise
    /// the function is unbound, its driver override is cleared and the kernel is asked to
    /// probe it again.
    #[tracing::instrument(level = "debug", skip(self), fields(pci = %addr))]
    pub async fn bind_default_driver(&self, addr: &PciAddress) -> Result<(), SysfsError> {
        if let Some(driver) = self.driver(addr).await? {
            if !UserspaceDriver::is_userspace(&driver) {
                return Ok(());
            }
            self.unbind(addr).await?;
        }
        let dir = self.pci_device_dir(addr);
        self.write_string(&dir.join("driver_override"), "\x00")
            .await?;
        self.write_string(&self.path(DRIVERS_PROBE), &addr.to_string())
            .await?;
        debug!("probed {addr} for its default driver");
        Ok(())
    }

    /// Bind the function to a specific driver using `driver_override`.
    ///
    /// Does nothing if the function is already bound to `driver`.
    #[tracing::instrument(level = "debug", skip(self), fields(pci = %addr))]
    pub async fn bind_driver(&self, addr: &PciAddress, driver: &str) -> Result<(), SysfsError> {
        if let Some(current) = self.driver(addr).await? {
            if current == driver {
                return Ok(());
            }
            self.unbind(addr).await?;
        }
        let override_path = self.pci_device_dir(addr).join("driver_override");
        self.write_string(&override_path, driver).await?;
        let bound = self
            .write_string(&self.pci_driver_dir(driver).join("bind"), &addr.to_string())
            .await;
        // the override must not outlive the bind attempt
        if let Err(e) = self.write_string(&override_path, "").await {
            warn!("failed to clear driver override of {addr}: {e}");
        }
        bound?;
        debug!("bound {addr} to {driver}");
        Ok(())
    }
}
