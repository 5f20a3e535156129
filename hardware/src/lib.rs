// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors
//
// # PCI identification for SR-IOV capable network devices

//! The `hardware` crate provides the strongly typed identifiers used to describe SR-IOV
//! capable network devices found on the PCI bus.
//!
//! ## Overview
//!
//! - [`pci::address::PciAddress`]: the `domain:bus:device.function` address which is the
//!   identity of every physical and virtual function on a host.
//! - [`pci::vendor::VendorId`] and [`pci::device::DeviceId`]: the 16-bit identifiers which,
//!   taken together, name a NIC model.
//! - [`pci::class::PciClass`]: the 24-bit class code used to tell network controllers apart
//!   from everything else on the bus.
//! - [`nic`]: the allow-list of NIC models which are known to support SR-IOV, including the
//!   VF device id each model spawns.
//! - [`link`]: link layer and eswitch mode reported by a network function.
//! - [`hwaddr`]: MAC addresses and InfiniBand GUIDs assigned to virtual functions.
//! - [`driver`]: the userspace (DPDK style) drivers a function may be bound to.
//!
//! ## Features
//!
//! - `serde`: Adds serialization support for all types using serde.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod driver;
pub mod hwaddr;
pub mod link;
pub mod nic;
pub mod pci;
