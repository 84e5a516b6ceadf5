// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host-side control of the registrar's WireGuard interface.
//!
//! Two seams are exposed so the registrar can be driven without a kernel:
//! - [`LinkControl`] manages the network link (create, address, bring up).
//! - [`TunnelControl`] reads and configures the WireGuard device itself.
//!
//! [`IpCommandLinks`] and [`KernelTunnel`] are the host implementations;
//! [`MockTunnel`] implements both in memory.

pub mod discover;
pub mod error;
pub mod ip_command;
pub mod kernel;
pub mod link;
pub mod mock;
pub mod tunnel;

pub use discover::discover_or_create;
pub use error::{DeviceError, LinkError, TunnelError};
pub use ip_command::IpCommandLinks;
pub use kernel::KernelTunnel;
pub use link::{LinkControl, NetworkLink};
pub use mock::{MockLink, MockTunnel, MockTunnelOp};
pub use tunnel::{DeviceConfig, PeerConfig, TunnelControl, TunnelDevice, TunnelPeer};
