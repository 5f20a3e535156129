// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Operating mode of NVIDIA BlueField cards.

use hardware::pci::address::PciAddress;
use tracing::debug;

const CPU_MODEL_PARAM: &str = "INTERNAL_CPU_MODEL";

#[derive(Debug, thiserror::Error)]
pub enum BlueFieldError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mstconfig failed for {pci}: {stderr}")]
    Failed { pci: PciAddress, stderr: String },
    #[error("cannot determine BlueField mode of {pci}: {reason}")]
    Unknown { pci: PciAddress, reason: String },
}

/// Whether the embedded Arm cores of a BlueField own the NIC.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum BlueFieldMode {
    /// The card runs as a DPU; its eswitch is managed from the Arm side.
    Dpu,
    /// The card behaves like a plain ConnectX NIC owned by the host.
    ConnectX,
}

/// Runs the `mstconfig` firmware tool.
#[derive(Clone, Debug)]
pub struct Mstconfig {
    program: String,
}

impl Default for Mstconfig {
    fn default() -> Self {
        Self {
            program: "mstconfig".to_string(),
        }
    }
}

impl Mstconfig {
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn mode(&self, pci: PciAddress) -> Result<BlueFieldMode, BlueFieldError> {
        let output = tokio::process::Command::new(&self.program)
            .args(["-e", "-d", &pci.to_string(), "q", CPU_MODEL_PARAM])
            .output()
            .await
            .map_err(|source| BlueFieldError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(BlueFieldError::Failed {
                pci,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let mode = parse_mode(pci, &String::from_utf8_lossy(&output.stdout))?;
        debug!("{pci} is in {mode} mode");
        Ok(mode)
    }
}

/// Parse the `INTERNAL_CPU_MODEL` line of `mstconfig -e q`.
///
/// With `-e` the line lists the default, current and next boot values; the current value is
/// used.  Without it only one value is printed.
fn parse_mode(pci: PciAddress, output: &str) -> Result<BlueFieldMode, BlueFieldError> {
    let unknown = |reason: String| BlueFieldError::Unknown { pci, reason };
    let line = output
        .lines()
        .find(|l| l.contains(CPU_MODEL_PARAM))
        .ok_or_else(|| unknown(format!("{CPU_MODEL_PARAM} not reported")))?;
    let values: Vec<&str> = line
        .split_whitespace()
        .skip_while(|f| *f != CPU_MODEL_PARAM)
        .skip(1)
        .collect();
    let value = match values.as_slice() {
        [_, current, _, ..] => *current,
        [.., last] => *last,
        [] => return Err(unknown(format!("no value for {CPU_MODEL_PARAM}"))),
    };
    let name = value.split('(').next().unwrap_or(value);
    match name {
        "EMBEDDED_CPU" => Ok(BlueFieldMode::Dpu),
        "SEPARATED_HOST" => Ok(BlueFieldMode::ConnectX),
        other => Err(unknown(format!("unexpected {CPU_MODEL_PARAM} {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{BlueFieldMode, parse_mode};
    use hardware::pci::address::PciAddress;

    fn pci() -> PciAddress {
        "0000:03:00.0".parse().unwrap()
    }

    #[test]
    fn extended_query_uses_current_value() {
        let out = "\
Device #1:
----------

Device type:    BlueField2
Name:           MBF2H332A-AEEO_Ax_Bx
Device:         0000:03:00.0

Configurations:                                      Default             Current             Next Boot
*        INTERNAL_CPU_MODEL                          SEPARATED_HOST(0)   EMBEDDED_CPU(1)     EMBEDDED_CPU(1)
";
        assert_eq!(parse_mode(pci(), out).unwrap(), BlueFieldMode::Dpu);
    }

    #[test]
    fn plain_query() {
        let out = "Configurations:          Next Boot\n    INTERNAL_CPU_MODEL    SEPARATED_HOST(0)\n";
        assert_eq!(parse_mode(pci(), out).unwrap(), BlueFieldMode::ConnectX);
    }

    #[test]
    fn unexpected_output() {
        assert!(parse_mode(pci(), "Device type: ConnectX6\n").is_err());
        assert!(parse_mode(pci(), "    INTERNAL_CPU_MODEL    \n").is_err());
        assert!(parse_mode(pci(), "    INTERNAL_CPU_MODEL    SOMETHING(2)\n").is_err());
    }
}
