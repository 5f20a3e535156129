// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Crate to control tracing dynamically at runtime

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod control;

// re-exports
pub use config::{DEFAULT_LOGLEVEL, TraceConfig};
pub use control::{TraceCtlError, TracingControl, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;
