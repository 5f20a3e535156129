// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Textual tracing configuration: a default level plus per-target overrides.
//!
//! The format is a comma separated list of `target=level` items, where the target
//! `default` sets the default level, e.g. `default=info,sriov_engine=debug`.  A bare level
//! is shorthand for `default=<level>`.

use crate::control::TraceCtlError;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

pub const DEFAULT_LOGLEVEL: LevelFilter = LevelFilter::INFO;

const DEFAULT_TARGET: &str = "default";

fn parse_level(level: &str) -> Result<LevelFilter, TraceCtlError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(TraceCtlError::InvalidLevel(level.trim().to_string())),
    }
}

/// Targets are module paths; dashes are accepted so that package names can be used as is.
fn normalize_target(target: &str) -> Result<String, TraceCtlError> {
    let valid = !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'));
    if valid {
        Ok(target.replace('-', "_"))
    } else {
        Err(TraceCtlError::InvalidTarget(target.to_string()))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceConfig {
    pub default: LevelFilter,
    pub targets: BTreeMap<String, LevelFilter>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOGLEVEL)
    }
}

impl TraceConfig {
    #[must_use]
    pub fn new(default: LevelFilter) -> Self {
        Self {
            default,
            targets: BTreeMap::new(),
        }
    }

    pub fn set_target(&mut self, target: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        self.targets.insert(normalize_target(target)?, level);
        Ok(())
    }

    /// The filter enforcing this configuration.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        // the bare level is the default directive; targets were validated on insertion
        let directives = std::iter::once(self.default.to_string())
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::builder().parse_lossy(directives)
    }
}

impl FromStr for TraceConfig {
    type Err = TraceCtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = TraceConfig::default();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            match item.split_once('=') {
                Some((target, level)) if target.trim() == DEFAULT_TARGET => {
                    config.default = parse_level(level)?;
                }
                Some((target, level)) => config.set_target(target.trim(), parse_level(level)?)?,
                None => {
                    config.default =
                        parse_level(item).map_err(|_| TraceCtlError::Malformed(item.to_string()))?;
                }
            }
        }
        Ok(config)
    }
}

impl Display for TraceConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{DEFAULT_TARGET}={}", self.default)?;
        for (target, level) in &self.targets {
            write!(f, ",{target}={level}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::TraceConfig;
    use crate::control::TraceCtlError;
    use pretty_assertions::assert_eq;
    use tracing::Level;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn parse_and_print() {
        let config: TraceConfig = "default=warn, sriov-engine=debug,sriov_sysfs::device=trace"
            .parse()
            .unwrap();
        assert_eq!(config.default, LevelFilter::WARN);
        assert_eq!(config.targets.get("sriov_engine"), Some(&LevelFilter::DEBUG));
        assert_eq!(
            config.to_string(),
            "default=warn,sriov_engine=debug,sriov_sysfs::device=trace"
        );
        let again: TraceConfig = config.to_string().parse().unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn bare_level_and_aliases() {
        let config: TraceConfig = "debug,sriov_daemon=Warning".parse().unwrap();
        assert_eq!(config.default, LevelFilter::DEBUG);
        assert_eq!(config.targets.get("sriov_daemon"), Some(&LevelFilter::WARN));
        assert_eq!("".parse::<TraceConfig>().unwrap(), TraceConfig::default());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            "default=loud".parse::<TraceConfig>(),
            Err(TraceCtlError::InvalidLevel(l)) if l == "loud"
        ));
        assert!(matches!(
            "sriov engine=debug".parse::<TraceConfig>(),
            Err(TraceCtlError::InvalidTarget(_))
        ));
        assert!(matches!(
            "verbose".parse::<TraceConfig>(),
            Err(TraceCtlError::Malformed(_))
        ));
    }

    #[test]
    fn filter_directives() {
        let config: TraceConfig = "default=error,sriov_engine=trace".parse().unwrap();
        let filter = config.env_filter().to_string();
        assert!(filter.contains("sriov_engine=trace"));
        assert!(filter.split(',').any(|d| d == "error"));
    }

    #[test]
    fn default_level_applies_to_other_targets() {
        let config: TraceConfig = "default=info,sriov_engine=debug".parse().unwrap();
        let subscriber = tracing_subscriber::registry().with(config.env_filter());
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "sriov_daemon", Level::ERROR));
            assert!(tracing::enabled!(target: "sriov_daemon", Level::INFO));
            assert!(!tracing::enabled!(target: "sriov_daemon", Level::DEBUG));
            assert!(tracing::enabled!(target: "sriov_engine", Level::DEBUG));
            assert!(!tracing::enabled!(target: "sriov_engine", Level::TRACE));
        });
    }
}
