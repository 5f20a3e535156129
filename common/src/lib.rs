// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Helpers shared by the crates of the SR-IOV configuration workspace.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]

pub mod retry;

pub use retry::{RetryError, RetryPolicy};
