// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of discovery, apply, reset and sync passes.
//!
//! Every error reachable from a sync pass can say which [`Stage`] it belongs to and, where
//! one is involved, which PF it concerns.

use crate::host::HostError;
use crate::store::StoreError;
use crate::udev::UdevError;
use common::RetryError;
use hardware::pci::address::PciAddress;

/// The part of a pass an error comes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Discovery,
    Validation,
    Kernel,
    Store,
    Precondition,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to enumerate PCI devices: {0}")]
    Enumerate(#[source] HostError),
}

/// Why a single attempt at writing an MTU failed.
#[derive(Debug, thiserror::Error)]
pub enum MtuAttemptError {
    #[error("{0} has no network interface")]
    NoInterface(PciAddress),
    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{pci}: {requested} VFs requested but the device supports at most {capacity}")]
    ExceedsCapacity {
        pci: PciAddress,
        requested: u32,
        capacity: u32,
    },
    #[error("{pci}: externally managed, cannot raise the VF count from {current} to {requested}")]
    ExternallyManagedIncrease {
        pci: PciAddress,
        requested: u32,
        current: u32,
    },
    #[error("{pci}: has no network interface")]
    NoInterface { pci: PciAddress },
    #[error("{pci}: {op} failed: {source}")]
    Host {
        pci: PciAddress,
        op: &'static str,
        #[source]
        source: HostError,
    },
    #[error("{pci}: {source}")]
    Udev {
        pci: PciAddress,
        #[source]
        source: UdevError,
    },
    #[error("{pci}: VF {vf_id} netdev did not appear")]
    VfNotReady { pci: PciAddress, vf_id: u32 },
    #[error("{pci}: VF {vf_id} has no usable hardware address")]
    VfAddress { pci: PciAddress, vf_id: u32 },
    #[error("{pci}: failed to set MTU {mtu}: {source}")]
    Mtu {
        pci: PciAddress,
        mtu: u32,
        #[source]
        source: RetryError<MtuAttemptError>,
    },
}

impl ApplyError {
    pub(crate) fn host(pci: PciAddress, op: &'static str) -> impl FnOnce(HostError) -> Self {
        move |source| ApplyError::Host { pci, op, source }
    }

    #[must_use]
    pub fn pci_address(&self) -> PciAddress {
        match self {
            ApplyError::ExceedsCapacity { pci, .. }
            | ApplyError::ExternallyManagedIncrease { pci, .. }
            | ApplyError::NoInterface { pci }
            | ApplyError::Host { pci, .. }
            | ApplyError::Udev { pci, .. }
            | ApplyError::VfNotReady { pci, .. }
            | ApplyError::VfAddress { pci, .. }
            | ApplyError::Mtu { pci, .. } => *pci,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            ApplyError::ExceedsCapacity { .. } | ApplyError::ExternallyManagedIncrease { .. } => {
                Stage::Validation
            }
            _ => Stage::Kernel,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("{pci}: failed to remove VFs: {source}")]
    NumVfs {
        pci: PciAddress,
        #[source]
        source: HostError,
    },
    #[error("{pci}: failed to restore MTU {mtu}: {source}")]
    Mtu {
        pci: PciAddress,
        mtu: u32,
        #[source]
        source: RetryError<MtuAttemptError>,
    },
}

impl ResetError {
    #[must_use]
    pub fn pci_address(&self) -> PciAddress {
        match self {
            ResetError::NumVfs { pci, .. } | ResetError::Mtu { pci, .. } => *pci,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("kernel lockdown is active, refusing to configure Mellanox device {pci}")]
    Lockdown { pci: PciAddress },
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("failed to configure {pci}: {source}")]
    Apply {
        pci: PciAddress,
        #[source]
        source: ApplyError,
    },
    #[error(transparent)]
    Reset(#[from] ResetError),
    #[error("{pci}: failed to save applied configuration: {source}")]
    StoreSave {
        pci: PciAddress,
        #[source]
        source: StoreError,
    },
    #[error("{pci}: cannot decide whether to skip the device: {source}")]
    Skip {
        pci: PciAddress,
        #[source]
        source: HostError,
    },
    #[error("{pci}: {source}")]
    Udev {
        pci: PciAddress,
        #[source]
        source: UdevError,
    },
}

impl SyncError {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            SyncError::Lockdown { .. } => Stage::Precondition,
            SyncError::Discovery(_) | SyncError::Skip { .. } => Stage::Discovery,
            SyncError::Apply { source, .. } => source.stage(),
            SyncError::Reset(_) | SyncError::Udev { .. } => Stage::Kernel,
            SyncError::StoreSave { .. } => Stage::Store,
        }
    }

    #[must_use]
    pub fn pci_address(&self) -> Option<PciAddress> {
        match self {
            SyncError::Lockdown { pci }
            | SyncError::StoreSave { pci, .. }
            | SyncError::Skip { pci, .. }
            | SyncError::Udev { pci, .. }
            | SyncError::Apply { pci, .. } => Some(*pci),
            SyncError::Reset(e) => Some(e.pci_address()),
            SyncError::Discovery(_) => None,
        }
    }
}
