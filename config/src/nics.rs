// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loading a replacement for the built-in table of supported NIC models.

use crate::ConfigError;
use hardware::nic::SupportedModels;
use std::path::Path;
use tracing::{debug, info};

/// Parse a YAML list of `{name, vendor, pfDevice, vfDevice}` entries.
pub fn supported_models_from_yaml(yaml: &str) -> Result<SupportedModels, ConfigError> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// The models listed in `path`, or the built-in table if no path is given.
pub fn load_supported_models(path: Option<&Path>) -> Result<SupportedModels, ConfigError> {
    let Some(path) = path else {
        debug!("using the built-in table of supported NICs");
        return Ok(SupportedModels::default());
    };
    let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let models = supported_models_from_yaml(&yaml)?;
    info!(
        "loaded {} supported NIC models from {}",
        models.models().len(),
        path.display()
    );
    Ok(models)
}
