// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

mod runner;

use crate::runner::Daemon;
use args::{CmdArgs, LaunchConfiguration, Parser};
use config::{SyncStatus, load_supported_models};
use engine::{EngineContext, FileStore, Host, InitialNodeState, LinuxHost, Reconciler, UdevRules};
use interface_manager::Netlink;
use miette::{Context, IntoDiagnostic};
use sysfs::{KNOWN_KERNEL_ARGS, Sysfs};
use tracectl::get_trace_ctl;
use tracing::{error, info, warn};

fn init_logging(launch: &LaunchConfiguration) -> miette::Result<()> {
    get_trace_ctl()
        .set_config(launch.tracing.config.clone())
        .into_diagnostic()
        .wrap_err("failed to set up tracing")?;
    info!(" ━━━━━━ SR-IOV config daemon started ━━━━━━");
    match serde_json::to_string(launch) {
        Ok(json) => info!("launch configuration: {json}"),
        Err(e) => warn!("cannot render the launch configuration: {e}"),
    }
    Ok(())
}

async fn report_kernel_args(host: &LinuxHost) {
    for arg in KNOWN_KERNEL_ARGS {
        match host.kernel_arg_set(arg).await {
            Ok(true) => info!("kernel argument {arg} is set"),
            Ok(false) => info!("kernel argument {arg} is not set"),
            Err(e) => warn!("cannot read the kernel command line: {e}"),
        }
    }
}

async fn run(launch: LaunchConfiguration) -> miette::Result<SyncStatus> {
    let sysfs = Sysfs::new(&launch.host.root);
    let netlink = Netlink::connect()
        .into_diagnostic()
        .wrap_err("failed to connect to netlink")?;
    let host = LinuxHost::new(sysfs, netlink);
    report_kernel_args(&host).await;

    let models = load_supported_models(launch.engine.supported_nics_file.as_deref())
        .into_diagnostic()
        .wrap_err("failed to load the supported NIC models")?;
    let udev = UdevRules::new(&launch.engine.udev_rules_dir, models.vf_device_ids());
    udev.prepare(launch.engine.udev_prepare_script.as_deref())
        .await
        .into_diagnostic()
        .wrap_err("failed to prepare udev")?;
    let ctx = EngineContext::new(launch.engine.cluster_type, udev, models)
        .with_unsupported(launch.engine.with_unsupported);
    let store = FileStore::new(&launch.state.store_dir);

    let mut reconciler = Reconciler::new(host, store, ctx);
    let initial = reconciler
        .discover()
        .await
        .into_diagnostic()
        .wrap_err("failed to capture the initial node state")?;
    info!("found {} SR-IOV physical functions", initial.len());
    reconciler.context_mut().initial_state = InitialNodeState::new(initial);

    let daemon = Daemon::new(reconciler, launch.state, launch.engine.pass_timeout);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
    let summary = daemon
        .run(launch.engine.once, launch.engine.resync_interval, shutdown)
        .await;
    Ok(summary.last)
}

fn main() -> miette::Result<()> {
    let args = CmdArgs::parse();
    let launch = LaunchConfiguration::try_from(args)?;
    init_logging(&launch)?;

    let once = launch.engine.once;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()
        .wrap_err("failed to start the tokio runtime")?;
    let last = runtime.block_on(run(launch))?;
    if once && last != SyncStatus::Succeeded {
        return Err(miette::miette!("the configuration pass failed"));
    }
    Ok(())
}
