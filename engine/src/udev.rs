// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! udev rules which keep NetworkManager away from the VFs we provision.

use hardware::pci::address::PciAddress;
use hardware::pci::device::DeviceId;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LEGACY_RULE: &str = "10-nm-unmanaged.rules";
const HELPER_SCRIPT: &str = "/etc/udev/disable-nm-sriov.sh";

#[derive(Debug, thiserror::Error)]
pub enum UdevError {
    #[error("udev rule i/o on {} failed: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to run udev preparation script {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("udev preparation script {} failed: {stderr}", .path.display())]
    Script { path: PathBuf, stderr: String },
}

/// Manages the per PF `10-nm-disable-<pci>.rules` files.
#[derive(Clone, Debug)]
pub struct UdevRules {
    dir: PathBuf,
    vf_ids: Vec<DeviceId>,
}

impl UdevRules {
    /// Default rules directory relative to the host root.
    pub const DEFAULT_DIR: &'static str = "/etc/udev/rules.d";

    /// Rules written to `dir` match VFs with any of the device ids in `vf_ids`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, vf_ids: Vec<DeviceId>) -> Self {
        Self {
            dir: dir.into(),
            vf_ids,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn rule_path(&self, pci: &PciAddress) -> PathBuf {
        self.dir.join(format!("10-nm-disable-{pci}.rules"))
    }

    /// The rule line for the VFs of `pci`.
    #[must_use]
    pub fn render(&self, pci: &PciAddress) -> String {
        let ids = self
            .vf_ids
            .iter()
            .map(|id| format!("0x{id}"))
            .collect::<Vec<_>>()
            .join("|");
        format!(
            "SUBSYSTEM==\"net\", ACTION==\"add|change|move\", ATTRS{{device}}==\"{ids}\", IMPORT{{program}}=\"{HELPER_SCRIPT} $env{{INTERFACE}} {pci}\""
        )
    }

    /// Remove the legacy node wide rule and run the optional helper preparation script.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn prepare(&self, script: Option<&Path>) -> Result<(), UdevError> {
        let legacy = self.dir.join(LEGACY_RULE);
        match tokio::fs::remove_file(&legacy).await {
            Ok(()) => info!("removed legacy udev rule {}", legacy.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove legacy udev rule {}: {e}", legacy.display()),
        }
        let Some(script) = script else {
            return Ok(());
        };
        let output = tokio::process::Command::new(script)
            .output()
            .await
            .map_err(|source| UdevError::Spawn {
                path: script.to_path_buf(),
                source,
            })?;
        if !output.status.success() {
            return Err(UdevError::Script {
                path: script.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(
            "udev preparation: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    /// Write the rule for `pci`.  The returned guard must be committed once the VFs it
    /// covers exist, or rolled back if creating them failed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn add(&self, pci: &PciAddress) -> Result<UdevRuleGuard, UdevError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| UdevError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let path = self.rule_path(pci);
        tokio::fs::write(&path, self.render(pci))
            .await
            .map_err(|source| UdevError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(UdevRuleGuard { path, armed: true })
    }

    /// Remove the rule for `pci`.  A missing rule is not an error.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remove(&self, pci: &PciAddress) -> Result<(), UdevError> {
        remove_rule(&self.rule_path(pci)).await
    }
}

async fn remove_rule(path: &Path) -> Result<(), UdevError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UdevError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// A freshly written udev rule pending the outcome of the VF count change it covers.
#[must_use = "a udev rule must be committed or rolled back"]
#[derive(Debug)]
pub struct UdevRuleGuard {
    path: PathBuf,
    armed: bool,
}

impl UdevRuleGuard {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the rule.
    pub fn commit(mut self) {
        self.armed = false;
    }

    /// Delete the rule again.
    pub async fn rollback(mut self) -> Result<(), UdevError> {
        self.armed = false;
        remove_rule(&self.path).await
    }
}

impl Drop for UdevRuleGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "udev rule {} was neither committed nor rolled back",
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{LEGACY_RULE, UdevRules};
    use hardware::pci::address::PciAddress;
    use hardware::pci::device::DeviceId;
    use pretty_assertions::assert_eq;

    fn pci() -> PciAddress {
        "0000:3b:00.0".parse().unwrap()
    }

    fn rules(dir: &std::path::Path) -> UdevRules {
        UdevRules::new(
            dir.join("rules.d"),
            vec![DeviceId::new(0x1018), DeviceId::new(0x154c)],
        )
    }

    #[test]
    fn rule_line() {
        let rules = UdevRules::new("/etc/udev/rules.d", vec![DeviceId::new(0x1018)]);
        assert_eq!(
            rules.render(&pci()),
            r#"SUBSYSTEM=="net", ACTION=="add|change|move", ATTRS{device}=="0x1018", IMPORT{program}="/etc/udev/disable-nm-sriov.sh $env{INTERFACE} 0000:3b:00.0""#
        );
        assert_eq!(
            rules.rule_path(&pci()).to_str().unwrap(),
            "/etc/udev/rules.d/10-nm-disable-0000:3b:00.0.rules"
        );
    }

    #[tokio::test]
    async fn add_commit_remove() {
        let dir = tempfile::tempdir().unwrap();
        let rules = rules(dir.path());
        let guard = rules.add(&pci()).await.unwrap();
        let path = guard.path().to_path_buf();
        guard.commit();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#"ATTRS{device}=="0x1018|0x154c""#));

        rules.remove(&pci()).await.unwrap();
        assert!(!path.exists());
        // removing twice is fine
        rules.remove(&pci()).await.unwrap();
    }

    #[tokio::test]
    async fn rollback_removes_rule() {
        let dir = tempfile::tempdir().unwrap();
        let rules = rules(dir.path());
        let guard = rules.add(&pci()).await.unwrap();
        let path = guard.path().to_path_buf();
        assert!(path.exists());
        guard.rollback().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn prepare_removes_legacy_rule() {
        let dir = tempfile::tempdir().unwrap();
        let rules = rules(dir.path());
        std::fs::create_dir_all(rules.dir()).unwrap();
        std::fs::write(rules.dir().join(LEGACY_RULE), "legacy").unwrap();
        rules.prepare(None).await.unwrap();
        assert!(!rules.dir().join(LEGACY_RULE).exists());
        // nothing to remove the second time
        rules.prepare(None).await.unwrap();
    }

    #[tokio::test]
    async fn failing_script_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let rules = rules(dir.path());
        let missing = dir.path().join("no-such-script.sh");
        assert!(rules.prepare(Some(&missing)).await.is_err());
    }
}
