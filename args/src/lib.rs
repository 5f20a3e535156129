// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of the SR-IOV configuration daemon and the launch configuration derived
//! from it.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub use clap::Parser;
use engine::{ClusterType, FileStore, UdevRules};
use serde::Serializer;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracectl::{TraceConfig, TraceCtlError};

const DEFAULT_STATUS_FILE: &str = "/run/sriov-config-daemon/status.yaml";

fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// `path` as seen from inside a container with the host filesystem mounted at `root`.
fn under_root(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

/// Where the host filesystem is found.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HostSection {
    pub root: PathBuf,
}

/// Parameters of the engine and of the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EngineSection {
    #[serde(serialize_with = "serialize_display")]
    pub cluster_type: ClusterType,
    pub with_unsupported: bool,
    pub supported_nics_file: Option<PathBuf>,
    pub udev_rules_dir: PathBuf,
    pub udev_prepare_script: Option<PathBuf>,
    pub resync_interval: Duration,
    pub pass_timeout: Option<Duration>,
    pub once: bool,
}

/// Files the daemon reads its desired state from and writes its observations to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StateSection {
    pub spec_file: PathBuf,
    pub status_file: PathBuf,
    pub store_dir: PathBuf,
}

/// Configuration for the tracing / logging of the daemon.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TracingConfigSection {
    #[serde(serialize_with = "serialize_display")]
    pub config: TraceConfig,
}

/// The configuration of the daemon, computed from its command line.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LaunchConfiguration {
    pub host: HostSection,
    pub engine: EngineSection,
    pub state: StateSection,
    pub tracing: TracingConfigSection,
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum InvalidCmdArguments {
    #[error("host root {} is not an absolute path", .0.display())]
    #[diagnostic(help("pass the directory the host filesystem is mounted at, e.g. /host"))]
    RelativeHostRoot(PathBuf),
    #[error("\"{0}\" is not a valid cluster type")]
    #[diagnostic(help("must be kubernetes or openshift"))]
    InvalidClusterType(String),
    #[error("invalid tracing configuration: {0}")]
    #[diagnostic(help("expected a comma separated list of target=level, e.g. default=info,sriov_engine=debug"))]
    InvalidTracing(#[from] TraceCtlError),
}

impl TryFrom<CmdArgs> for LaunchConfiguration {
    type Error = InvalidCmdArguments;

    fn try_from(value: CmdArgs) -> Result<Self, InvalidCmdArguments> {
        if !value.host_root.is_absolute() {
            return Err(InvalidCmdArguments::RelativeHostRoot(value.host_root));
        }
        let cluster_type = value
            .cluster_type
            .parse::<ClusterType>()
            .map_err(|_| InvalidCmdArguments::InvalidClusterType(value.cluster_type.clone()))?;
        let tracing = match &value.tracing {
            Some(config) => config.parse::<TraceConfig>()?,
            None => TraceConfig::default(),
        };
        let root = value.host_root;
        Ok(LaunchConfiguration {
            engine: EngineSection {
                cluster_type,
                with_unsupported: value.with_unsupported,
                supported_nics_file: value.supported_nics_file,
                udev_rules_dir: value
                    .udev_rules_dir
                    .unwrap_or_else(|| under_root(&root, UdevRules::DEFAULT_DIR)),
                udev_prepare_script: value.udev_prepare_script,
                resync_interval: Duration::from_secs(value.resync_interval),
                pass_timeout: value.pass_timeout.map(Duration::from_secs),
                once: value.once,
            },
            state: StateSection {
                spec_file: value.spec_file,
                status_file: value.status_file,
                store_dir: value
                    .store_dir
                    .unwrap_or_else(|| under_root(&root, FileStore::DEFAULT_DIR)),
            },
            tracing: TracingConfigSection { config: tracing },
            host: HostSection { root },
        })
    }
}

#[derive(Parser, Debug, serde::Serialize)]
#[command(name = "sriov-config-daemon")]
#[command(version)]
#[command(about = "Discovers SR-IOV devices and converges them to a desired configuration", long_about = None)]
pub struct CmdArgs {
    #[arg(
        long,
        env = "HOST_ROOT",
        value_name = "DIR",
        default_value = "/",
        help = "Directory the host filesystem is mounted at; sysfs, /proc and default state directories are resolved below it"
    )]
    host_root: PathBuf,

    #[arg(
        long,
        env = "SRIOV_SPEC_FILE",
        value_name = "FILE",
        help = "YAML file holding the desired node configuration, re-read on every pass"
    )]
    spec_file: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        default_value = DEFAULT_STATUS_FILE,
        help = "YAML file the observed node status is written to after every pass"
    )]
    status_file: PathBuf,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory of the per-PF record of applied configuration [default: <host-root>/etc/sriov-operator/pci]"
    )]
    store_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory NetworkManager udev rules are written to [default: <host-root>/etc/udev/rules.d]"
    )]
    udev_rules_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Script run once at startup to prepare the udev helpers"
    )]
    udev_prepare_script: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        help = "YAML table replacing the built-in list of supported NIC models"
    )]
    supported_nics_file: Option<PathBuf>,

    #[arg(
        long,
        env = "CLUSTER_TYPE",
        value_name = "TYPE",
        default_value = "kubernetes",
        help = "Type of the cluster the node belongs to: kubernetes or openshift"
    )]
    cluster_type: String,

    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Time between two reconciliation passes"
    )]
    resync_interval: u64,

    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Abandon a pass which takes longer than this"
    )]
    pass_timeout: Option<u64>,

    #[arg(long, default_value_t = false, help = "Run a single pass and exit")]
    once: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Also manage SR-IOV devices which are not in the table of supported models"
    )]
    with_unsupported: bool,

    #[arg(
        long,
        value_name = "tracing configuration",
        help = "Tracing config string as comma-separated sequence of target=level, with level one in [off,error,warn,info,debug,trace].
Passing default=level sets the default log-level.
E.g. default=warn,sriov_engine=debug"
    )]
    tracing: Option<String>,
}

impl CmdArgs {
    #[must_use]
    pub fn tracing(&self) -> Option<&String> {
        self.tracing.as_ref()
    }

    #[must_use]
    pub fn once(&self) -> bool {
        self.once
    }
}
