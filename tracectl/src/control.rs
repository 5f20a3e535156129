// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The process-wide tracing subscriber and the handle to reconfigure it.

use crate::config::TraceConfig;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

#[derive(Debug, thiserror::Error)]
pub enum TraceCtlError {
    #[error("invalid log level \"{0}\"")]
    InvalidLevel(String),
    #[error("invalid tracing target \"{0}\"")]
    InvalidTarget(String),
    #[error("malformed tracing configuration item \"{0}\"")]
    Malformed(String),
    #[error("failed to update the tracing filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Owner of the reloadable filter of the global subscriber.
pub struct TracingControl {
    handle: reload::Handle<EnvFilter, Registry>,
    config: Mutex<TraceConfig>,
    installed: bool,
}

static TRACE_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get the tracing control, installing the global subscriber on first use.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACE_CTL.get_or_init(TracingControl::install)
}

impl TracingControl {
    fn install() -> Self {
        let config = TraceConfig::default();
        let (filter, handle) = reload::Layer::new(config.env_filter());
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .is_ok();
        Self {
            handle,
            config: Mutex::new(config),
            installed,
        }
    }

    fn config(&self) -> MutexGuard<'_, TraceConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False if another global subscriber was installed first (as test harnesses do), in
    /// which case changes are recorded but have no effect on output.
    #[must_use]
    pub fn installed(&self) -> bool {
        self.installed
    }

    /// Replace the whole configuration.
    pub fn set_config(&self, config: TraceConfig) -> Result<(), TraceCtlError> {
        let mut current = self.config();
        if self.installed {
            self.handle.reload(config.env_filter())?;
        }
        debug!("tracing configuration is now {config}");
        *current = config;
        Ok(())
    }

    pub fn set_default_level(&self, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut config = self.config().clone();
        config.default = level;
        self.set_config(config)
    }

    pub fn set_target_level(&self, target: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut config = self.config().clone();
        config.set_target(target, level)?;
        self.set_config(config)
    }

    /// Replace the whole configuration with the one described by `s`.  On error the
    /// current configuration is kept.
    pub fn setup_from_string(&self, s: &str) -> Result<(), TraceCtlError> {
        self.set_config(s.parse()?)
    }

    #[must_use]
    pub fn default_level(&self) -> LevelFilter {
        self.config().default
    }

    #[must_use]
    pub fn as_config_string(&self) -> String {
        self.config().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::get_trace_ctl;
    use crate::config::DEFAULT_LOGLEVEL;
    use serial_test::serial;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    #[serial]
    fn configure_from_string() {
        let tctl = get_trace_ctl();
        tctl.setup_from_string("default=warn,sriov-engine=debug")
            .unwrap();
        assert_eq!(tctl.as_config_string(), "default=warn,sriov_engine=debug");

        tctl.set_default_level(LevelFilter::TRACE).unwrap();
        assert_eq!(tctl.default_level(), LevelFilter::TRACE);
        assert_eq!(tctl.as_config_string(), "default=trace,sriov_engine=debug");

        tctl.set_target_level("sriov_daemon", LevelFilter::ERROR)
            .unwrap();
        assert_eq!(
            tctl.as_config_string(),
            "default=trace,sriov_daemon=error,sriov_engine=debug"
        );
        tctl.setup_from_string("").unwrap();
        assert_eq!(tctl.default_level(), DEFAULT_LOGLEVEL);
    }

    #[test]
    #[serial]
    fn invalid_string_keeps_configuration() {
        let tctl = get_trace_ctl();
        tctl.setup_from_string("default=debug").unwrap();
        assert!(tctl.setup_from_string("default=debug,x=loud").is_err());
        assert_eq!(tctl.as_config_string(), "default=debug");
        assert!(tctl.set_target_level("no spaces", LevelFilter::INFO).is_err());
        assert_eq!(tctl.as_config_string(), "default=debug");
    }
}
