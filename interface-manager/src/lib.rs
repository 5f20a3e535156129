// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Netlink and devlink operations on SR-IOV physical functions.
//!
//! [`link::Netlink`] wraps an rtnetlink connection and exposes only the handful of link
//! operations needed to bring a PF up and to assign addresses to its VFs.
//! [`devlink::Devlink`] queries the eswitch mode of a PF.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod devlink;
pub mod link;

pub use devlink::{Devlink, DevlinkError};
pub use link::{Link, Netlink, NetlinkError};
