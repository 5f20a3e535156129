// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use hardware::link::EswitchMode;
use hardware::pci::address::PciAddress;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DevlinkError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("devlink failed for {pci}: {stderr}")]
    Failed { pci: PciAddress, stderr: String },
    #[error("unparsable devlink output for {pci}: {reason}")]
    Output { pci: PciAddress, reason: String },
}

#[derive(Deserialize)]
struct EswitchShow {
    dev: HashMap<String, EswitchAttributes>,
}

#[derive(Deserialize)]
struct EswitchAttributes {
    mode: Option<String>,
}

/// Runs the `devlink` utility.
#[derive(Clone, Debug)]
pub struct Devlink {
    program: String,
}

impl Default for Devlink {
    fn default() -> Self {
        Self::new("devlink")
    }
}

impl Devlink {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Query the eswitch mode of a PF.
    ///
    /// Devices whose driver has no devlink eswitch support are reported as `None`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn eswitch_mode(&self, pci: PciAddress) -> Result<Option<EswitchMode>, DevlinkError> {
        let output = tokio::process::Command::new(&self.program)
            .args(["-j", "dev", "eswitch", "show", &format!("pci/{pci}")])
            .output()
            .await
            .map_err(|source| DevlinkError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_unsupported(&stderr) {
                debug!("{pci} has no eswitch: {stderr}");
                return Ok(None);
            }
            return Err(DevlinkError::Failed { pci, stderr });
        }
        parse_eswitch_show(pci, &output.stdout)
    }
}

fn is_unsupported(stderr: &str) -> bool {
    stderr.contains("Operation not supported") || stderr.contains("No such device")
}

fn parse_eswitch_show(pci: PciAddress, stdout: &[u8]) -> Result<Option<EswitchMode>, DevlinkError> {
    let output_err = |reason: String| DevlinkError::Output { pci, reason };
    let show: EswitchShow =
        serde_json::from_slice(stdout).map_err(|e| output_err(e.to_string()))?;
    let Some(attrs) = show.dev.get(&format!("pci/{pci}")) else {
        return Err(output_err("device missing from reply".to_string()));
    };
    attrs
        .mode
        .as_deref()
        .map(|mode| {
            mode.parse::<EswitchMode>()
                .map_err(|_| output_err(format!("unknown eswitch mode {mode}")))
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{is_unsupported, parse_eswitch_show};
    use hardware::link::EswitchMode;
    use hardware::pci::address::PciAddress;

    fn pci() -> PciAddress {
        "0000:3b:00.0".parse().unwrap()
    }

    #[test]
    fn parses_mode() {
        let out = br#"{"dev":{"pci/0000:3b:00.0":{"mode":"switchdev","inline-mode":"none","encap-mode":"basic"}}}"#;
        assert_eq!(
            parse_eswitch_show(pci(), out).unwrap(),
            Some(EswitchMode::Switchdev)
        );
        let out = br#"{"dev":{"pci/0000:3b:00.0":{"mode":"legacy"}}}"#;
        assert_eq!(parse_eswitch_show(pci(), out).unwrap(), Some(EswitchMode::Legacy));
    }

    #[test]
    fn missing_mode_is_none() {
        let out = br#"{"dev":{"pci/0000:3b:00.0":{}}}"#;
        assert_eq!(parse_eswitch_show(pci(), out).unwrap(), None);
    }

    #[test]
    fn bad_output_is_an_error() {
        assert!(parse_eswitch_show(pci(), b"not json").is_err());
        assert!(parse_eswitch_show(pci(), br#"{"dev":{}}"#).is_err());
        assert!(
            parse_eswitch_show(pci(), br#"{"dev":{"pci/0000:3b:00.0":{"mode":"bridge"}}}"#)
                .is_err()
        );
    }

    #[test]
    fn unsupported_devices() {
        assert!(is_unsupported(
            "kernel answers: Operation not supported"
        ));
        assert!(is_unsupported("devlink answers: No such device"));
        assert!(!is_unsupported("devlink answers: Permission denied"));
    }
}
