// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;
use std::time::Duration;

use ipnet::IpNet;
use registrar_k8s::WireguardIP;
use registrar_wgtunnel_common::{WgKeyPair, WgPrivateKey, WgPublicKey};
use registrar_wgtunnel_device::{DeviceConfig, PeerConfig, TunnelControl};
use serde::{Serialize, Serializer};
use tracing::{info, instrument};

use crate::error::{RegistrarError, Result};

pub const PERSISTENT_KEEPALIVE: Duration = Duration::from_secs(5);

/// Everything a remote node needs to join the tunnel.
///
/// The registrar generates the peer's key pair itself, so the descriptor
/// carries the private half (as the preshared key) and must be delivered
/// to the node over a trusted channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDescriptor {
	pub public_key: WgPublicKey,
	#[serde(serialize_with = "serialize_private_key")]
	pub preshared_key: WgPrivateKey,
	pub allowed_ips: Vec<IpNet>,
	#[serde(rename = "persistentKeepaliveSecs", serialize_with = "serialize_secs")]
	pub persistent_keepalive: Duration,
}

fn serialize_private_key<S: Serializer>(key: &WgPrivateKey, serializer: S) -> std::result::Result<S::Ok, S::Error> {
	serializer.serialize_str(key.to_base64().expose())
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
	serializer.serialize_u64(duration.as_secs())
}

/// Parse a requested peer address into its allowed-IP entry. Without a
/// prefix length the entry is a host route.
pub fn peer_allowed_ip(address: &str, prefix_len: Option<u8>) -> Result<IpNet> {
	let addr: IpAddr = address
		.trim()
		.parse()
		.map_err(|source| RegistrarError::InvalidAddress {
			address: address.to_string(),
			source,
		})?;
	let prefix_len = prefix_len.unwrap_or(match addr {
		IpAddr::V4(_) => 32,
		IpAddr::V6(_) => 128,
	});
	IpNet::new(addr, prefix_len).map_err(|_| RegistrarError::InvalidPrefixLen {
		address: addr,
		prefix_len,
	})
}

/// Generate a key pair for a new peer and add it to `device_name` without
/// touching the peers already configured there.
#[instrument(skip(tunnel, request), fields(request = request.name(), address = %request.spec.ip_address))]
pub async fn register_peer(
	tunnel: &dyn TunnelControl,
	device_name: &str,
	request: &WireguardIP,
	prefix_len: Option<u8>,
) -> Result<PeerDescriptor> {
	let allowed_ip = peer_allowed_ip(&request.spec.ip_address, prefix_len)?;

	let pair = WgKeyPair::generate();
	let public_key = *pair.public_key();
	let private_key = pair.private_key().clone();

	let peer = PeerConfig {
		public_key,
		preshared_key: Some(private_key.clone()),
		allowed_ips: vec![allowed_ip],
		persistent_keepalive: Some(PERSISTENT_KEEPALIVE.as_secs() as u16),
		replace_allowed_ips: true,
	};
	let config = DeviceConfig {
		private_key: None,
		replace_peers: false,
		peers: vec![peer],
	};
	tunnel
		.configure(device_name, &config)
		.await
		.map_err(RegistrarError::device_config("failed to add peer"))?;

	info!(%public_key, %allowed_ip, "registered peer");

	Ok(PeerDescriptor {
		public_key,
		preshared_key: private_key,
		allowed_ips: vec![allowed_ip],
		persistent_keepalive: PERSISTENT_KEEPALIVE,
	})
}
