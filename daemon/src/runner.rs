// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The reconciliation loop.

use args::StateSection;
use config::{ConfigError, NodeSpec, NodeStatus, SyncStatus};
use engine::{Host, PfStatusStore, Reconciler, Stage, SyncError};
use hardware::pci::address::PciAddress;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("failed to load the desired configuration: {0}")]
    Spec(#[from] ConfigError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("pass did not complete within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl PassError {
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PassError::Spec(_) => Some(Stage::Validation),
            PassError::Sync(e) => Some(e.stage()),
            PassError::Timeout(_) => None,
        }
    }

    #[must_use]
    pub fn pci_address(&self) -> Option<PciAddress> {
        match self {
            PassError::Spec(ConfigError::Invalid { pci, .. }) => Some(*pci),
            PassError::Sync(e) => e.pci_address(),
            PassError::Spec(_) | PassError::Timeout(_) => None,
        }
    }
}

/// How the loop ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunSummary {
    pub passes: u32,
    pub last: SyncStatus,
}

pub struct Daemon<H: Host, S: PfStatusStore> {
    reconciler: Reconciler<H, S>,
    state: StateSection,
    pass_timeout: Option<Duration>,
}

impl<H: Host, S: PfStatusStore> Daemon<H, S> {
    pub fn new(reconciler: Reconciler<H, S>, state: StateSection, pass_timeout: Option<Duration>) -> Self {
        Self {
            reconciler,
            state,
            pass_timeout,
        }
    }

    async fn sync(&self) -> Result<(), PassError> {
        let desired = NodeSpec::load(&self.state.spec_file)?;
        let pass = self.reconciler.pass(&desired);
        match self.pass_timeout {
            Some(limit) => tokio::time::timeout(limit, pass)
                .await
                .map_err(|_| PassError::Timeout(limit))??,
            None => pass.await?,
        };
        Ok(())
    }

    /// Run one pass and publish the resulting node status.
    pub async fn run_pass(&self) -> NodeStatus {
        let (sync_status, last_sync_error) = match self.sync().await {
            Ok(()) => {
                info!("pass succeeded");
                (SyncStatus::Succeeded, None)
            }
            Err(e) => {
                let stage = e.stage().map_or("-", <&'static str>::from);
                let pci = e.pci_address().map(|p| p.to_string()).unwrap_or_default();
                error!(stage = %stage, pci = %pci, "pass failed: {e}");
                (SyncStatus::Failed, Some(e.to_string()))
            }
        };
        let interfaces = self.reconciler.discover().await.unwrap_or_else(|e| {
            error!("cannot report node status: {e}");
            vec![]
        });
        let status = NodeStatus {
            interfaces,
            sync_status,
            last_sync_error,
        };
        match status.save(&self.state.status_file) {
            Ok(()) => debug!("status written to {}", self.state.status_file.display()),
            Err(e) => error!("failed to publish node status: {e}"),
        }
        status
    }

    /// Run passes every `interval` until `shutdown` completes, or a single one if `once`.
    pub async fn run(
        &self,
        once: bool,
        interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> RunSummary {
        tokio::pin!(shutdown);
        let mut summary = RunSummary {
            passes: 0,
            last: SyncStatus::InProgress,
        };
        loop {
            summary.last = self.run_pass().await.sync_status;
            summary.passes += 1;
            if once {
                return summary;
            }
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutting down after {} passes", summary.passes);
                    return summary;
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{Daemon, PassError};
    use args::StateSection;
    use common::RetryPolicy;
    use config::{NodeStatus, SyncStatus};
    use engine::Reconciler;
    use engine::fake::{FakeHost, FakeOp, test_context_in};
    use engine::store::MemoryStore;
    use hardware::pci::address::PciAddress;
    use hardware::pci::device::DeviceId;
    use hardware::pci::vendor::VendorId;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    const PCI: &str = "0000:3b:00.0";

    fn daemon(dir: &TempDir, pass_timeout: Option<Duration>) -> Daemon<FakeHost, MemoryStore> {
        let host = FakeHost::new();
        let pci: PciAddress = PCI.parse().unwrap();
        host.add_pf(pci, "ens2f0", VendorId::INTEL, DeviceId::new(0x159b), 8, "ice");
        host.set_vf_driver(&pci, "iavf");
        let udev_dir = dir.path().join("udev");
        std::fs::create_dir(&udev_dir).unwrap();
        let state = StateSection {
            spec_file: dir.path().join("spec.yaml"),
            status_file: dir.path().join("status.yaml"),
            store_dir: dir.path().join("store"),
        };
        let reconciler = Reconciler::new(host, MemoryStore::new(), test_context_in(&udev_dir));
        Daemon::new(reconciler, state, pass_timeout)
    }

    fn write_spec(dir: &TempDir, num_vfs: u32, mtu: u32) {
        let yaml = format!("interfaces:\n- pciAddress: \"{PCI}\"\n  numVfs: {num_vfs}\n  mtu: {mtu}\n");
        std::fs::write(dir.path().join("spec.yaml"), yaml).unwrap();
    }

    fn published(path: &Path) -> NodeStatus {
        serde_yaml_ng::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn pass_publishes_status() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon(&dir, None);
        write_spec(&dir, 2, 0);
        let status = daemon.run_pass().await;
        assert_eq!(status.sync_status, SyncStatus::Succeeded);
        assert_eq!(status.last_sync_error, None);
        assert_eq!(status.interfaces[0].num_vfs, 2);
        let published = published(&dir.path().join("status.yaml"));
        assert_eq!(published.sync_status, SyncStatus::Succeeded);
        assert_eq!(published.interfaces[0].num_vfs, 2);
        assert_eq!(published.interfaces[0].vfs.len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_pass_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon(&dir, None);
        write_spec(&dir, 16, 0);
        let status = daemon.run_pass().await;
        assert_eq!(status.sync_status, SyncStatus::Failed);
        assert!(status.last_sync_error.unwrap().contains(PCI));
        assert_eq!(status.interfaces[0].num_vfs, 0);
        assert!(logs_contain("validation"));
    }

    #[tokio::test]
    async fn missing_spec_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon(&dir, None);
        let status = daemon.run_pass().await;
        assert_eq!(status.sync_status, SyncStatus::Failed);
        assert!(status.last_sync_error.unwrap().contains("spec.yaml"));
        assert_eq!(status.interfaces.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_pass_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = daemon(&dir, Some(Duration::from_secs(2)));
        daemon.reconciler.context_mut().mtu_retry =
            RetryPolicy::new(Duration::from_secs(1), 10);
        daemon.reconciler.host().fail(FakeOp::WriteMtu);
        write_spec(&dir, 0, 9000);
        let err = daemon.sync().await.unwrap_err();
        assert!(matches!(err, PassError::Timeout(d) if d == Duration::from_secs(2)));
        assert_eq!(err.stage(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = daemon(&dir, None);
        write_spec(&dir, 2, 0);
        let summary = daemon
            .run(
                false,
                Duration::from_secs(10),
                tokio::time::sleep(Duration::from_secs(25)),
            )
            .await;
        assert_eq!(summary.passes, 3);
        assert_eq!(summary.last, SyncStatus::Succeeded);

        let summary = daemon
            .run(true, Duration::from_secs(10), std::future::pending())
            .await;
        assert_eq!(summary.passes, 1);
    }
}
