// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! SR-IOV node configuration model.
//!
//! - [`spec`]: the desired configuration of a node, as delivered by the orchestrator.
//! - [`status`]: the observed state of the SR-IOV devices of a node.
//! - [`nics`]: the table of supported NIC models, optionally replaced from a file.
//! - [`record`]: what is remembered on the host about the last configuration applied to
//!   each physical function.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod nics;
pub mod record;
pub mod spec;
pub mod status;

use std::path::PathBuf;

pub use nics::load_supported_models;
pub use record::PfStatusRecord;
pub use spec::{
    DeviceType, InterfaceSpec, InterfaceSpecBuilder, NodeSpec, VfGroup, VfGroupBuilder, VfRange,
};
pub use status::{NodeStatus, PhysicalFunction, SyncStatus, VirtualFunction};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{pci}: {reason}")]
    Invalid {
        pci: hardware::pci::address::PciAddress,
        reason: String,
    },
}

pub type ConfigResult = Result<(), ConfigError>;
