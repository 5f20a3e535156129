// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Access to the parts of sysfs and procfs needed to discover and configure SR-IOV devices.
//!
//! Every path is resolved relative to a configurable root so that the agent can run in a
//! container with the host filesystem mounted somewhere other than `/`, and so that tests
//! can point it at a temporary directory tree.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

mod driver;
mod kernel;
mod net;
mod pci;

#[cfg(test)]
mod fixture;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use kernel::{KNOWN_KERNEL_ARGS, KernelArg};

/// Errors returned by [`Sysfs`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SysfsError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {value:?} to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        value: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected content {content:?} in {}", .path.display())]
    Parse { path: PathBuf, content: String },
    #[error("no PCI devices found under {}", .0.display())]
    NoDevices(PathBuf),
}

impl SysfsError {
    /// True if the error was caused by a missing file.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            SysfsError::Read { source, .. } | SysfsError::Write { source, .. } => {
                source.kind() == ErrorKind::NotFound
            }
            SysfsError::Parse { .. } | SysfsError::NoDevices(_) => false,
        }
    }
}

/// A view of the kernel's sysfs and procfs trees, rooted at a configurable path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sysfs {
    root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Sysfs {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an absolute host path against the root.
    #[must_use]
    pub fn path(&self, host_path: impl AsRef<Path>) -> PathBuf {
        let host_path = host_path.as_ref();
        self.root
            .join(host_path.strip_prefix("/").unwrap_or(host_path))
    }

    async fn read_string(&self, path: &Path) -> Result<String, SysfsError> {
        tokio::fs::read_to_string(path)
            .await
            .map(|s| s.trim().to_string())
            .map_err(|source| SysfsError::Read {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn read_parsed<T: std::str::FromStr>(&self, path: &Path) -> Result<T, SysfsError> {
        let content = self.read_string(path).await?;
        content.parse().map_err(|_| SysfsError::Parse {
            path: path.to_path_buf(),
            content,
        })
    }

    async fn write_string(&self, path: &Path, value: &str) -> Result<(), SysfsError> {
        tracing::trace!("writing {value:?} to {}", path.display());
        tokio::fs::write(path, value.as_bytes())
            .await
            .map_err(|source| SysfsError::Write {
                path: path.to_path_buf(),
                value: value.to_string(),
                source,
            })
    }

    async fn read_link_name(&self, path: &Path) -> Result<Option<String>, SysfsError> {
        match tokio::fs::read_link(path).await {
            Ok(target) => Ok(target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SysfsError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, SysfsError> {
        let read_err = |source| SysfsError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut entries = tokio::fs::read_dir(path).await.map_err(read_err)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::Sysfs;
    use std::path::PathBuf;

    #[test]
    fn paths_are_rooted() {
        let sysfs = Sysfs::new("/host");
        assert_eq!(
            sysfs.path("/sys/bus/pci/devices"),
            PathBuf::from("/host/sys/bus/pci/devices")
        );
        assert_eq!(Sysfs::default().path("/proc/cmdline"), PathBuf::from("/proc/cmdline"));
    }
}
