// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use ipnet::IpNet;
use registrar_wgtunnel_common::{WgPrivateKey, WgPublicKey};

use crate::error::TunnelError;

/// A peer as currently configured on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelPeer {
	pub public_key: WgPublicKey,
	pub preshared_key: Option<WgPrivateKey>,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: Option<u16>,
}

/// Snapshot of a WireGuard device as reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDevice {
	pub name: String,
	/// Public half of the device identity. `None` while the device still has
	/// the all-zero private key it was created with.
	pub identity: Option<WgPublicKey>,
	pub peers: Vec<TunnelPeer>,
}

/// Upsert of a single peer, keyed by `public_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
	pub public_key: WgPublicKey,
	pub preshared_key: Option<WgPrivateKey>,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: Option<u16>,
	/// Replace this peer's allowed IPs instead of appending to them.
	pub replace_allowed_ips: bool,
}

/// Configuration delta applied to a device in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
	pub private_key: Option<WgPrivateKey>,
	/// Drop every peer not listed in `peers`.
	pub replace_peers: bool,
	pub peers: Vec<PeerConfig>,
}

/// Trait abstracting WireGuard device control for testability.
#[async_trait]
pub trait TunnelControl: Send + Sync {
	/// All WireGuard devices on the host.
	async fn devices(&self) -> Result<Vec<TunnelDevice>, TunnelError>;

	async fn device(&self, name: &str) -> Result<TunnelDevice, TunnelError>;

	/// Apply `config` atomically; on error the device is left unchanged.
	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<(), TunnelError>;
}
