// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An in-memory [`Host`] for tests.
//!
//! [`FakeHost`] models PCI functions, their drivers and netdevs closely enough for discovery
//! and apply to run against it: writing a VF count creates VF functions and netdevs, binding
//! a VF to a userspace driver hides its netdev, and every mutation is recorded as a
//! [`HostCall`].

use crate::bluefield::{BlueFieldError, BlueFieldMode};
use crate::context::{ClusterType, EngineContext};
use crate::host::{Host, HostError};
use crate::udev::UdevRules;
use common::RetryPolicy;
use hardware::driver::UserspaceDriver;
use hardware::hwaddr::{Guid, Mac};
use hardware::link::{EswitchMode, LinkType};
use hardware::nic::SupportedModels;
use hardware::pci::address::PciAddress;
use hardware::pci::class::PciClass;
use hardware::pci::device::DeviceId;
use hardware::pci::vendor::VendorId;
use interface_manager::{Link, NetlinkError};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sysfs::{KernelArg, SysfsError};

const NETWORK_CLASS: u32 = 0x02_00_00;

/// A mutation performed through the [`Host`] interface.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostCall {
    WriteNumVfs(PciAddress, u32),
    WriteMtu(String, u32),
    Unbind(PciAddress),
    BindDefaultDriver(PciAddress),
    BindDriver(PciAddress, UserspaceDriver),
    SetLinkUp(String),
    SetVfMac(String, u32, Mac),
    SetVfGuid(String, u32, Guid),
}

/// Operations whose failure can be injected with [`FakeHost::fail`].
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum FakeOp {
    WriteNumVfs,
    WriteMtu,
    Unbind,
    BindDefaultDriver,
    BindDriver,
    SetLinkUp,
    SetVfMac,
    SetVfGuid,
    ReadLockdown,
}

#[derive(Clone, Debug)]
struct FakeDevice {
    class: u32,
    vendor: VendorId,
    device: DeviceId,
    driver: Option<String>,
    default_driver: Option<String>,
    net_names: Vec<String>,
    physfn: Option<PciAddress>,
    total_vfs: Option<u32>,
    vfs: Vec<(u32, PciAddress)>,
    vf_driver: Option<String>,
    eswitch_mode: Option<EswitchMode>,
    bluefield_mode: Option<BlueFieldMode>,
    vf_list_fails: bool,
    netdev_stuck: bool,
}

impl FakeDevice {
    fn new(class: u32, vendor: VendorId, device: DeviceId) -> Self {
        Self {
            class,
            vendor,
            device,
            driver: None,
            default_driver: None,
            net_names: vec![],
            physfn: None,
            total_vfs: None,
            vfs: vec![],
            vf_driver: None,
            eswitch_mode: None,
            bluefield_mode: None,
            vf_list_fails: false,
            netdev_stuck: false,
        }
    }
}

#[derive(Clone, Debug)]
struct FakeNetdev {
    index: u32,
    mtu: u32,
    mac: Mac,
    speed: Option<u32>,
    switch_id: Option<String>,
    port_name: Option<String>,
    link_type: LinkType,
    up: bool,
}

#[derive(Debug, Default)]
struct State {
    devices: BTreeMap<PciAddress, FakeDevice>,
    netdevs: BTreeMap<String, FakeNetdev>,
    calls: Vec<HostCall>,
    /// Injected failures; `None` fails forever, `Some(n)` fails `n` more times.
    failures: BTreeMap<FakeOp, Option<u32>>,
    lockdown: bool,
    cmdline: Vec<String>,
    hide_vf_netdevs: bool,
    stuck_vf_netdevs: bool,
    next_index: u32,
}

impl State {
    fn device(&self, pci: &PciAddress) -> Result<&FakeDevice, HostError> {
        self.devices.get(pci).ok_or_else(|| not_found(pci.to_string()))
    }

    fn device_mut(&mut self, pci: &PciAddress) -> Result<&mut FakeDevice, HostError> {
        self.devices
            .get_mut(pci)
            .ok_or_else(|| not_found(pci.to_string()))
    }

    fn netdev(&self, ifname: &str) -> Result<&FakeNetdev, HostError> {
        self.netdevs.get(ifname).ok_or_else(|| not_found(ifname))
    }

    fn add_netdev(&mut self, ifname: &str, mac: Mac, link_type: LinkType) {
        self.next_index += 1;
        let index = self.next_index;
        self.netdevs
            .entry(ifname.to_string())
            .or_insert(FakeNetdev {
                index,
                mtu: 1500,
                mac,
                speed: None,
                switch_id: None,
                port_name: None,
                link_type,
                up: false,
            });
    }

    fn check(&mut self, op: FakeOp) -> Result<(), HostError> {
        match self.failures.get_mut(&op) {
            None => Ok(()),
            Some(None) => Err(injected(op)),
            Some(Some(remaining)) => {
                *remaining -= 1;
                if *remaining == 0 {
                    self.failures.remove(&op);
                }
                Err(injected(op))
            }
        }
    }

    fn visible_names(&self, device: &FakeDevice) -> Vec<String> {
        if device.physfn.is_some() {
            let bound_to_kernel = device
                .driver
                .as_deref()
                .is_some_and(|d| !UserspaceDriver::is_userspace(d));
            if !bound_to_kernel || self.hide_vf_netdevs || device.netdev_stuck {
                return vec![];
            }
        }
        device.net_names.clone()
    }

    fn remove_vfs(&mut self, pf: &PciAddress) {
        let Some(device) = self.devices.get_mut(pf) else {
            return;
        };
        let vfs = std::mem::take(&mut device.vfs);
        for (_, vf) in vfs {
            if let Some(dev) = self.devices.remove(&vf) {
                for name in dev.net_names {
                    self.netdevs.remove(&name);
                }
            }
        }
    }

    fn create_vfs(&mut self, pf: &PciAddress, num_vfs: u32) -> Result<(), HostError> {
        let device = self.device(pf)?.clone();
        let pf_name = device
            .net_names
            .first()
            .cloned()
            .unwrap_or_else(|| format!("pf{:02x}{}", pf.bus(), pf.function()));
        let link_type = device
            .net_names
            .first()
            .and_then(|n| self.netdevs.get(n))
            .map_or(LinkType::Ethernet, |n| n.link_type);
        let mut vfs = Vec::new();
        for vf_id in 0..num_vfs {
            let slot = u8::try_from(vf_id).map_err(|_| injected(FakeOp::WriteNumVfs))?;
            let addr = PciAddress::new(
                pf.domain(),
                pf.bus(),
                0x10 + pf.function() * 4 + slot / 8,
                slot % 8,
            )
            .map_err(|_| injected(FakeOp::WriteNumVfs))?;
            let name = format!("{pf_name}v{vf_id}");
            let mac = Mac([0x02, 0x00, pf.bus(), pf.function(), 0x00, slot]);
            self.add_netdev(&name, mac, link_type);
            let mut vf = FakeDevice::new(NETWORK_CLASS, device.vendor, device.device);
            vf.physfn = Some(*pf);
            vf.driver.clone_from(&device.vf_driver);
            vf.default_driver.clone_from(&device.vf_driver);
            vf.net_names = vec![name];
            vf.netdev_stuck = self.stuck_vf_netdevs;
            self.devices.insert(addr, vf);
            vfs.push((vf_id, addr));
        }
        self.device_mut(pf)?.vfs = vfs;
        Ok(())
    }
}

fn not_found(what: impl Into<PathBuf>) -> HostError {
    HostError::Sysfs(SysfsError::Read {
        path: what.into(),
        source: std::io::Error::from(ErrorKind::NotFound),
    })
}

fn injected(op: FakeOp) -> HostError {
    HostError::Sysfs(SysfsError::Write {
        path: PathBuf::from(format!("{op:?}")),
        value: String::new(),
        source: std::io::Error::other("injected failure"),
    })
}

/// See the module documentation.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<State>,
}

impl FakeHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a PCI function without a driver or netdev.
    pub fn add_device(&self, pci: PciAddress, class: u32, vendor: VendorId, device: DeviceId) {
        self.state()
            .devices
            .insert(pci, FakeDevice::new(class, vendor, device));
    }

    /// Add a network PF bound to `driver` with one netdev.  A `total_vfs` of zero means the
    /// function is not SR-IOV capable.  Its VFs use the same driver by default.
    pub fn add_pf(
        &self,
        pci: PciAddress,
        ifname: &str,
        vendor: VendorId,
        device: DeviceId,
        total_vfs: u32,
        driver: &str,
    ) {
        let mut state = self.state();
        let mut dev = FakeDevice::new(NETWORK_CLASS, vendor, device);
        dev.driver = Some(driver.to_string());
        dev.default_driver = Some(driver.to_string());
        dev.vf_driver = Some(driver.to_string());
        dev.total_vfs = (total_vfs > 0).then_some(total_vfs);
        dev.net_names = vec![ifname.to_string()];
        let mac = Mac([0x0c, 0x42, 0xa1, pci.bus(), pci.device(), pci.function()]);
        state.add_netdev(ifname, mac, LinkType::Ethernet);
        state.devices.insert(pci, dev);
    }

    /// Replace the netdev names of `pci`, creating netdevs which do not exist yet.
    pub fn set_net_names(&self, pci: &PciAddress, names: &[&str]) {
        let mut state = self.state();
        for name in names {
            state.add_netdev(name, Mac::ZERO, LinkType::Ethernet);
        }
        if let Some(dev) = state.devices.get_mut(pci) {
            dev.net_names = names.iter().map(ToString::to_string).collect();
        }
    }

    fn with_netdev(&self, ifname: &str, f: impl FnOnce(&mut FakeNetdev)) {
        if let Some(netdev) = self.state().netdevs.get_mut(ifname) {
            f(netdev);
        }
    }

    fn with_device(&self, pci: &PciAddress, f: impl FnOnce(&mut FakeDevice)) {
        if let Some(dev) = self.state().devices.get_mut(pci) {
            f(dev);
        }
    }

    pub fn set_switch_id(&self, ifname: &str) {
        self.with_netdev(ifname, |n| n.switch_id = Some("a1b2c3d4".to_string()));
    }

    pub fn set_switch_port(&self, ifname: &str, port: &str) {
        self.with_netdev(ifname, |n| {
            n.switch_id = Some("a1b2c3d4".to_string());
            n.port_name = Some(port.to_string());
        });
    }

    pub fn set_speed(&self, ifname: &str, speed: u32) {
        self.with_netdev(ifname, |n| n.speed = Some(speed));
    }

    pub fn set_mtu(&self, ifname: &str, mtu: u32) {
        self.with_netdev(ifname, |n| n.mtu = mtu);
    }

    pub fn set_link_type(&self, ifname: &str, link_type: LinkType) {
        self.with_netdev(ifname, |n| n.link_type = link_type);
    }

    pub fn set_link_up_now(&self, ifname: &str) {
        self.with_netdev(ifname, |n| n.up = true);
    }

    pub fn set_eswitch_mode(&self, pci: &PciAddress, mode: EswitchMode) {
        self.with_device(pci, |d| d.eswitch_mode = Some(mode));
    }

    pub fn set_bluefield_mode(&self, pci: &PciAddress, mode: BlueFieldMode) {
        self.with_device(pci, |d| d.bluefield_mode = Some(mode));
    }

    pub fn set_driver(&self, pci: &PciAddress, driver: Option<&str>) {
        self.with_device(pci, |d| d.driver = driver.map(ToString::to_string));
    }

    /// The driver VFs of `pf` are bound to when created or probed.
    pub fn set_vf_driver(&self, pf: &PciAddress, driver: &str) {
        self.with_device(pf, |d| d.vf_driver = Some(driver.to_string()));
    }

    pub fn fail_vf_list(&self, pf: &PciAddress) {
        self.with_device(pf, |d| d.vf_list_fails = true);
    }

    pub fn set_lockdown(&self, active: bool) {
        self.state().lockdown = active;
    }

    pub fn set_cmdline(&self, args: &[&str]) {
        self.state().cmdline = args.iter().map(ToString::to_string).collect();
    }

    /// Make `op` fail from now on.
    pub fn fail(&self, op: FakeOp) {
        self.state().failures.insert(op, None);
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_times(&self, op: FakeOp, times: u32) {
        if times > 0 {
            self.state().failures.insert(op, Some(times));
        }
    }

    /// Never show VF netdevs.
    pub fn hide_vf_netdevs(&self, hide: bool) {
        self.state().hide_vf_netdevs = hide;
    }

    /// Show netdevs of VFs created from now on only once they are re-probed.
    pub fn stuck_vf_netdevs(&self, stuck: bool) {
        self.state().stuck_vf_netdevs = stuck;
    }

    /// Provision VFs without recording a call.
    pub fn write_num_vfs_now(&self, pf: &PciAddress, num_vfs: u32) {
        let mut state = self.state();
        state.remove_vfs(pf);
        // a PF which does not exist simply gets no VFs
        let _ = state.create_vfs(pf, num_vfs);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    #[must_use]
    pub fn vfs_of(&self, pf: &PciAddress) -> Vec<(u32, PciAddress)> {
        self.state()
            .devices
            .get(pf)
            .map(|d| d.vfs.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn driver_of(&self, pci: &PciAddress) -> Option<String> {
        self.state().devices.get(pci).and_then(|d| d.driver.clone())
    }

    #[must_use]
    pub fn mtu_of(&self, ifname: &str) -> Option<u32> {
        self.state().netdevs.get(ifname).map(|n| n.mtu)
    }

    #[must_use]
    pub fn is_up(&self, ifname: &str) -> bool {
        self.state().netdevs.get(ifname).is_some_and(|n| n.up)
    }

    fn record(&self, op: FakeOp, call: HostCall) -> Result<MutexGuard<'_, State>, HostError> {
        let mut state = self.state();
        state.calls.push(call);
        state.check(op)?;
        Ok(state)
    }
}

impl Host for FakeHost {
    async fn pci_devices(&self) -> Result<Vec<PciAddress>, HostError> {
        let state = self.state();
        if state.devices.is_empty() {
            return Err(HostError::Sysfs(SysfsError::NoDevices(PathBuf::from(
                "/sys/bus/pci/devices",
            ))));
        }
        Ok(state.devices.keys().copied().collect())
    }

    async fn pci_class(&self, pci: &PciAddress) -> Result<PciClass, HostError> {
        let class = self.state().device(pci)?.class;
        PciClass::new(class).map_err(|_| {
            HostError::Sysfs(SysfsError::Parse {
                path: PathBuf::from(pci.to_string()),
                content: format!("{class:#x}"),
            })
        })
    }

    async fn pci_ids(&self, pci: &PciAddress) -> Result<(VendorId, DeviceId), HostError> {
        let state = self.state();
        let dev = state.device(pci)?;
        Ok((dev.vendor, dev.device))
    }

    async fn is_vf(&self, pci: &PciAddress) -> bool {
        self.state()
            .devices
            .get(pci)
            .is_some_and(|d| d.physfn.is_some())
    }

    async fn driver(&self, pci: &PciAddress) -> Result<Option<String>, HostError> {
        Ok(self.state().device(pci)?.driver.clone())
    }

    async fn net_names(&self, pci: &PciAddress) -> Result<Vec<String>, HostError> {
        let state = self.state();
        let dev = state.device(pci)?;
        Ok(state.visible_names(dev))
    }

    async fn sriov_capacity(&self, pci: &PciAddress) -> Result<Option<u32>, HostError> {
        Ok(self.state().device(pci)?.total_vfs)
    }

    async fn num_vfs(&self, pci: &PciAddress) -> Result<u32, HostError> {
        let state = self.state();
        let dev = state.device(pci)?;
        Ok(u32::try_from(dev.vfs.len()).unwrap_or(u32::MAX))
    }

    async fn vf_list(&self, pf: &PciAddress) -> Result<Vec<(u32, PciAddress)>, HostError> {
        let state = self.state();
        let dev = state.device(pf)?;
        if dev.vf_list_fails {
            return Err(not_found(format!("{pf}/virtfn0")));
        }
        Ok(dev.vfs.clone())
    }

    async fn eswitch_mode(&self, pci: &PciAddress) -> Result<Option<EswitchMode>, HostError> {
        Ok(self.state().device(pci)?.eswitch_mode)
    }

    async fn bluefield_mode(&self, pci: &PciAddress) -> Result<BlueFieldMode, HostError> {
        self.state().device(pci)?.bluefield_mode.ok_or_else(|| {
            HostError::BlueField(BlueFieldError::Unknown {
                pci: *pci,
                reason: "no mode configured".to_string(),
            })
        })
    }

    async fn mtu(&self, ifname: &str) -> Result<u32, HostError> {
        Ok(self.state().netdev(ifname)?.mtu)
    }

    async fn mac(&self, ifname: &str) -> Result<String, HostError> {
        Ok(self.state().netdev(ifname)?.mac.to_string())
    }

    async fn speed(&self, ifname: &str) -> Result<Option<u32>, HostError> {
        Ok(self.state().netdev(ifname)?.speed)
    }

    async fn phys_switch_id(&self, ifname: &str) -> Result<Option<String>, HostError> {
        Ok(self.state().netdev(ifname)?.switch_id.clone())
    }

    async fn phys_port_name(&self, ifname: &str) -> Result<String, HostError> {
        self.state()
            .netdev(ifname)?
            .port_name
            .clone()
            .ok_or_else(|| not_found(format!("{ifname}/phys_port_name")))
    }

    async fn link(&self, ifname: &str) -> Result<Link, HostError> {
        let state = self.state();
        let netdev = state
            .netdevs
            .get(ifname)
            .ok_or_else(|| HostError::Netlink(NetlinkError::NotFound(ifname.to_string())))?;
        Ok(Link {
            index: netdev.index,
            name: ifname.to_string(),
            oper_up: netdev.up,
            link_type: netdev.link_type,
            address: netdev.mac.0.to_vec(),
        })
    }

    async fn write_num_vfs(&self, pci: &PciAddress, num_vfs: u32) -> Result<(), HostError> {
        let mut state = self.record(FakeOp::WriteNumVfs, HostCall::WriteNumVfs(*pci, num_vfs))?;
        state.device(pci)?;
        state.remove_vfs(pci);
        state.create_vfs(pci, num_vfs)
    }

    async fn write_mtu(&self, ifname: &str, mtu: u32) -> Result<(), HostError> {
        let mut state = self.record(FakeOp::WriteMtu, HostCall::WriteMtu(ifname.to_string(), mtu))?;
        let netdev = state
            .netdevs
            .get_mut(ifname)
            .ok_or_else(|| not_found(ifname))?;
        netdev.mtu = mtu;
        Ok(())
    }

    async fn unbind(&self, pci: &PciAddress) -> Result<(), HostError> {
        let mut state = self.record(FakeOp::Unbind, HostCall::Unbind(*pci))?;
        state.device_mut(pci)?.driver = None;
        Ok(())
    }

    async fn bind_default_driver(&self, pci: &PciAddress) -> Result<(), HostError> {
        let mut state = self.record(FakeOp::BindDefaultDriver, HostCall::BindDefaultDriver(*pci))?;
        let dev = state.device_mut(pci)?;
        let kernel_bound = dev
            .driver
            .as_deref()
            .is_some_and(|d| !UserspaceDriver::is_userspace(d));
        if !kernel_bound {
            dev.driver.clone_from(&dev.default_driver);
            dev.netdev_stuck = false;
        }
        Ok(())
    }

    async fn bind_driver(&self, pci: &PciAddress, driver: UserspaceDriver) -> Result<(), HostError> {
        let mut state = self.record(FakeOp::BindDriver, HostCall::BindDriver(*pci, driver))?;
        state.device_mut(pci)?.driver = Some(driver.name().to_string());
        Ok(())
    }

    async fn set_link_up(&self, link: &Link) -> Result<(), HostError> {
        let mut state = self.record(FakeOp::SetLinkUp, HostCall::SetLinkUp(link.name.clone()))?;
        let netdev = state
            .netdevs
            .get_mut(&link.name)
            .ok_or_else(|| HostError::Netlink(NetlinkError::NotFound(link.name.clone())))?;
        netdev.up = true;
        Ok(())
    }

    async fn set_vf_mac(&self, pf: &Link, vf: u32, mac: Mac) -> Result<(), HostError> {
        let _state =
            self.record(FakeOp::SetVfMac, HostCall::SetVfMac(pf.name.clone(), vf, mac))?;
        Ok(())
    }

    async fn set_vf_guid(&self, pf: &Link, vf: u32, guid: Guid) -> Result<(), HostError> {
        let _state =
            self.record(FakeOp::SetVfGuid, HostCall::SetVfGuid(pf.name.clone(), vf, guid))?;
        Ok(())
    }

    async fn lockdown_active(&self) -> Result<bool, HostError> {
        let mut state = self.state();
        state.check(FakeOp::ReadLockdown)?;
        Ok(state.lockdown)
    }

    async fn kernel_arg_set(&self, arg: KernelArg) -> Result<bool, HostError> {
        let arg = arg.to_string();
        Ok(self.state().cmdline.iter().any(|a| *a == arg))
    }
}

/// A context with fast retry policies whose udev rules go to `udev_dir`.
#[must_use]
pub fn test_context_in(udev_dir: &Path) -> EngineContext {
    let models = SupportedModels::default();
    let udev = UdevRules::new(udev_dir, models.vf_device_ids());
    let mut ctx = EngineContext::new(ClusterType::Kubernetes, udev, models);
    ctx.mtu_retry = RetryPolicy::new(Duration::from_millis(1), 3);
    ctx.vf_ready = RetryPolicy::new(Duration::from_millis(1), 3);
    ctx
}

/// A context for tests which never touch udev rules.
#[must_use]
pub fn test_context() -> EngineContext {
    test_context_in(Path::new("/nonexistent/udev/rules.d"))
}
