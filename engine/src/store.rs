// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Persistence of the last configuration applied to each PF.

use config::{InterfaceSpec, PfStatusRecord};
use hardware::pci::address::PciAddress;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o on {} failed: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Per PF record of applied configuration.
#[allow(async_fn_in_trait)]
pub trait PfStatusStore {
    /// The record for `pci`, or `None` if nothing was ever applied to it.
    async fn load(&self, pci: &PciAddress) -> Result<Option<PfStatusRecord>, StoreError>;
    /// Insert or replace the record for the PF `spec` describes.
    async fn save_applied(&self, spec: &InterfaceSpec) -> Result<(), StoreError>;
}

/// One JSON document per PF, named after its PCI address.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Default location of the store relative to the host root.
    pub const DEFAULT_DIR: &'static str = "/etc/sriov-operator/pci";

    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, pci: &PciAddress) -> PathBuf {
        self.dir.join(pci.to_string())
    }
}

impl PfStatusStore for FileStore {
    async fn load(&self, pci: &PciAddress) -> Result<Option<PfStatusRecord>, StoreError> {
        let path = self.record_path(pci);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        PfStatusRecord::from_json(&json)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    async fn save_applied(&self, spec: &InterfaceSpec) -> Result<(), StoreError> {
        let path = self.record_path(&spec.pci_address);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;
        let json = PfStatusRecord::from(spec)
            .to_json()
            .map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err(&path))?;
        debug!("saved applied configuration of {}", spec.pci_address);
        Ok(())
    }
}

#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;

#[cfg(any(test, feature = "testing"))]
mod memory {
    use super::{PfStatusStore, StoreError};
    use config::{InterfaceSpec, PfStatusRecord};
    use hardware::pci::address::PciAddress;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::{Mutex, PoisonError};

    /// An in-memory store.  Loads and saves can be made to fail to exercise error paths.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        records: Mutex<BTreeMap<PciAddress, PfStatusRecord>>,
        failing_loads: Mutex<bool>,
        failing_saves: Mutex<bool>,
    }

    impl MemoryStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, spec: &InterfaceSpec) {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(spec.pci_address, PfStatusRecord::from(spec));
        }

        #[must_use]
        pub fn get(&self, pci: &PciAddress) -> Option<PfStatusRecord> {
            self.records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(pci)
                .cloned()
        }

        pub fn fail_loads(&self, fail: bool) {
            *self.failing_loads.lock().unwrap_or_else(PoisonError::into_inner) = fail;
        }

        pub fn fail_saves(&self, fail: bool) {
            *self.failing_saves.lock().unwrap_or_else(PoisonError::into_inner) = fail;
        }
    }

    impl PfStatusStore for MemoryStore {
        async fn load(&self, pci: &PciAddress) -> Result<Option<PfStatusRecord>, StoreError> {
            if *self.failing_loads.lock().unwrap_or_else(PoisonError::into_inner) {
                return Err(StoreError::Io {
                    path: PathBuf::from(pci.to_string()),
                    source: std::io::Error::other("injected load failure"),
                });
            }
            Ok(self.get(pci))
        }

        async fn save_applied(&self, spec: &InterfaceSpec) -> Result<(), StoreError> {
            if *self.failing_saves.lock().unwrap_or_else(PoisonError::into_inner) {
                return Err(StoreError::Io {
                    path: PathBuf::from(spec.pci_address.to_string()),
                    source: std::io::Error::other("injected save failure"),
                });
            }
            self.insert(spec);
            Ok(())
        }
    }
}
