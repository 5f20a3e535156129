// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! SR-IOV configuration engine.
//!
//! The engine discovers the SR-IOV capable physical functions of a host, compares them
//! against a [`config::NodeSpec`] and drives the host towards it: VF counts, drivers, MTUs,
//! MAC addresses and InfiniBand GUIDs.  All access to the host goes through the [`Host`]
//! trait, which is implemented over sysfs and netlink by [`LinuxHost`].
//!
//! A pass is run by a [`Reconciler`]:
//!
//! 1. [`Reconciler::discover`] snapshots the observed state,
//! 2. [`pfs_to_skip`] decides which PFs must be left alone,
//! 3. [`Reconciler::sync`] applies or resets each remaining PF.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod bluefield;
pub mod context;
pub mod decision;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod guid;
pub mod host;
pub mod inventory;
mod mtu;
pub mod orchestrator;
pub mod reset;
pub mod store;
pub mod udev;

pub use context::{ClusterType, EngineContext, InitialNodeState};
pub use decision::{needs_update, pfs_to_skip, should_skip};
pub use error::{ApplyError, DiscoveryError, ResetError, Stage, SyncError};
pub use host::{Host, HostError, LinuxHost};
pub use inventory::discover;
pub use orchestrator::Reconciler;
pub use store::{FileStore, PfStatusStore, StoreError};
pub use udev::{UdevError, UdevRules};
