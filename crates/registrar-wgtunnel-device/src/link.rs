// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use ipnet::IpNet;

use crate::error::LinkError;

/// Kernel link bound to a WireGuard device. The link name always equals the
/// device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLink {
	pub index: u32,
	pub name: String,
	pub up: bool,
}

/// Trait abstracting kernel link operations for testability.
#[async_trait]
pub trait LinkControl: Send + Sync {
	/// Create a WireGuard-type link with the given name.
	async fn add_link(&self, name: &str) -> Result<(), LinkError>;

	/// Look up a link by name. Returns `None` if the kernel has no such link.
	async fn link_by_name(&self, name: &str) -> Result<Option<NetworkLink>, LinkError>;

	/// Assign `address` to the link, replacing an existing entry for the same
	/// address instead of failing. Safe to call repeatedly.
	async fn replace_address(&self, link: &NetworkLink, address: IpNet) -> Result<(), LinkError>;

	/// Bring the link administratively up.
	async fn set_up(&self, link: &NetworkLink) -> Result<(), LinkError>;
}
