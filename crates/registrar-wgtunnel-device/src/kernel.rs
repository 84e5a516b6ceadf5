// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use ipnet::IpNet;
use registrar_wgtunnel_common::{WgPrivateKey, WgPublicKey};
use tracing::{debug, instrument};
use wireguard_control::{Backend, Device, DeviceUpdate, InterfaceName, Key, PeerConfigBuilder};

use crate::error::TunnelError;
use crate::tunnel::{DeviceConfig, TunnelControl, TunnelDevice, TunnelPeer};

/// Tunnel control through the WireGuard netlink (or userspace) API.
///
/// `wireguard-control` is blocking, so every call runs on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct KernelTunnel {
	backend: Backend,
}

impl KernelTunnel {
	pub fn new() -> Self {
		Self {
			#[cfg(target_os = "linux")]
			backend: Backend::Kernel,
			#[cfg(not(target_os = "linux"))]
			backend: Backend::Userspace,
		}
	}

	pub fn with_backend(backend: Backend) -> Self {
		Self { backend }
	}
}

impl Default for KernelTunnel {
	fn default() -> Self {
		Self::new()
	}
}

fn interface_name(name: &str) -> Result<InterfaceName, TunnelError> {
	name
		.parse::<InterfaceName>()
		.map_err(|_| TunnelError::InvalidInterfaceName(name.to_string()))
}

fn to_wg_key(encoded: &str, device: &str) -> Result<Key, TunnelError> {
	Key::from_base64(encoded).map_err(|_| TunnelError::InvalidKey(device.to_string()))
}

fn read_device(iface: &InterfaceName, backend: Backend) -> Result<TunnelDevice, TunnelError> {
	let name = iface.to_string();
	let device = Device::get(iface, backend).map_err(|source| {
		if source.kind() == std::io::ErrorKind::NotFound {
			TunnelError::DeviceNotFound(name.clone())
		} else {
			TunnelError::Read {
				name: name.clone(),
				source,
			}
		}
	})?;

	let identity = match &device.private_key {
		Some(key) => {
			let private = WgPrivateKey::from_base64(&key.to_base64())
				.map_err(|_| TunnelError::InvalidKey(name.clone()))?;
			(!private.is_zero()).then(|| private.public_key())
		}
		None => None,
	};

	let peers = device
		.peers
		.iter()
		.map(|info| {
			let config = &info.config;
			let public_key = WgPublicKey::from_base64(&config.public_key.to_base64())
				.map_err(|_| TunnelError::InvalidKey(name.clone()))?;
			let preshared_key = config
				.preshared_key
				.as_ref()
				.map(|k| WgPrivateKey::from_base64(&k.to_base64()))
				.transpose()
				.map_err(|_| TunnelError::InvalidKey(name.clone()))?;
			let allowed_ips = config
				.allowed_ips
				.iter()
				.filter_map(|ip| IpNet::new(ip.address, ip.cidr).ok())
				.collect();
			Ok(TunnelPeer {
				public_key,
				preshared_key,
				allowed_ips,
				persistent_keepalive: config.persistent_keepalive_interval,
			})
		})
		.collect::<Result<Vec<_>, TunnelError>>()?;

	Ok(TunnelDevice {
		name,
		identity,
		peers,
	})
}

fn build_update(name: &str, config: &DeviceConfig) -> Result<DeviceUpdate, TunnelError> {
	let mut update = DeviceUpdate::new();

	if let Some(private_key) = &config.private_key {
		update = update.set_private_key(to_wg_key(private_key.to_base64().expose(), name)?);
	}
	if config.replace_peers {
		update = update.replace_peers();
	}

	for peer in &config.peers {
		let public_key = to_wg_key(&peer.public_key.to_base64(), name)?;
		let mut builder = PeerConfigBuilder::new(&public_key);
		if let Some(psk) = &peer.preshared_key {
			builder = builder.set_preshared_key(to_wg_key(psk.to_base64().expose(), name)?);
		}
		if peer.replace_allowed_ips {
			builder = builder.replace_allowed_ips();
		}
		for net in &peer.allowed_ips {
			builder = builder.add_allowed_ip(net.addr(), net.prefix_len());
		}
		if let Some(interval) = peer.persistent_keepalive {
			builder = builder.set_persistent_keepalive_interval(interval);
		}
		update = update.add_peer(builder);
	}

	Ok(update)
}

#[async_trait]
impl TunnelControl for KernelTunnel {
	#[instrument(skip(self))]
	async fn devices(&self) -> Result<Vec<TunnelDevice>, TunnelError> {
		let backend = self.backend;
		tokio::task::spawn_blocking(move || {
			let names = Device::list(backend).map_err(TunnelError::List)?;
			names
				.iter()
				.map(|iface| read_device(iface, backend))
				.collect::<Result<Vec<_>, _>>()
		})
		.await?
	}

	#[instrument(skip(self))]
	async fn device(&self, name: &str) -> Result<TunnelDevice, TunnelError> {
		let iface = interface_name(name)?;
		let backend = self.backend;
		tokio::task::spawn_blocking(move || read_device(&iface, backend)).await?
	}

	#[instrument(skip(self, config), fields(replace_peers = config.replace_peers, peers = config.peers.len(), sets_key = config.private_key.is_some()))]
	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<(), TunnelError> {
		let iface = interface_name(name)?;
		let update = build_update(name, config)?;
		let backend = self.backend;
		let owned_name = name.to_string();

		tokio::task::spawn_blocking(move || {
			update
				.apply(&iface, backend)
				.map_err(|source| TunnelError::Configure {
					name: owned_name,
					source,
				})
		})
		.await??;

		debug!("applied device configuration");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_overlong_interface_name() {
		let err = interface_name("this-name-is-far-too-long").unwrap_err();
		assert!(matches!(err, TunnelError::InvalidInterfaceName(_)));
	}

	#[test]
	fn accepts_default_interface_name() {
		assert_eq!(interface_name("wg0").unwrap().to_string(), "wg0");
	}

	#[test]
	fn build_update_accepts_generated_keys() {
		let private = WgPrivateKey::generate();
		let config = DeviceConfig {
			private_key: Some(private.clone()),
			replace_peers: true,
			peers: vec![crate::tunnel::PeerConfig {
				public_key: private.public_key(),
				preshared_key: Some(private),
				allowed_ips: vec!["10.8.0.5/32".parse().unwrap()],
				persistent_keepalive: Some(5),
				replace_allowed_ips: true,
			}],
		};
		assert!(build_update("wg0", &config).is_ok());
	}
}
