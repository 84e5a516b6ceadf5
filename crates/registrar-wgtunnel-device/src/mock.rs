// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory kernel for tests.
//!
//! [`MockTunnel`] implements both [`LinkControl`] and [`TunnelControl`] over
//! one shared state, so adding a link makes a device appear the way the
//! kernel does for WireGuard links.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ipnet::IpNet;
use registrar_wgtunnel_common::WgPrivateKey;

use crate::error::{LinkError, TunnelError};
use crate::link::{LinkControl, NetworkLink};
use crate::tunnel::{DeviceConfig, TunnelControl, TunnelDevice, TunnelPeer};

/// Operations on [`MockTunnel`] that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockTunnelOp {
	ListDevices,
	GetDevice,
	Configure,
	AddLink,
	LinkByName,
	ReplaceAddress,
	SetUp,
}

/// Observable state of a mock link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLink {
	pub index: u32,
	pub up: bool,
	pub addresses: Vec<IpNet>,
}

#[derive(Default)]
struct MockDevice {
	private_key: Option<WgPrivateKey>,
	peers: Vec<TunnelPeer>,
}

impl MockDevice {
	fn snapshot(&self, name: &str) -> TunnelDevice {
		TunnelDevice {
			name: name.to_string(),
			identity: self
				.private_key
				.as_ref()
				.filter(|k| !k.is_zero())
				.map(|k| k.public_key()),
			peers: self.peers.clone(),
		}
	}

	fn apply(&mut self, config: &DeviceConfig) {
		if let Some(key) = &config.private_key {
			self.private_key = Some(key.clone());
		}
		if config.replace_peers {
			self.peers.clear();
		}
		for update in &config.peers {
			match self
				.peers
				.iter_mut()
				.find(|p| p.public_key == update.public_key)
			{
				Some(existing) => {
					if update.preshared_key.is_some() {
						existing.preshared_key = update.preshared_key.clone();
					}
					if update.persistent_keepalive.is_some() {
						existing.persistent_keepalive = update.persistent_keepalive;
					}
					if update.replace_allowed_ips {
						existing.allowed_ips.clear();
					}
					for net in &update.allowed_ips {
						if !existing.allowed_ips.contains(net) {
							existing.allowed_ips.push(*net);
						}
					}
				}
				None => self.peers.push(TunnelPeer {
					public_key: update.public_key,
					preshared_key: update.preshared_key.clone(),
					allowed_ips: update.allowed_ips.clone(),
					persistent_keepalive: update.persistent_keepalive,
				}),
			}
		}
	}
}

#[derive(Default)]
struct MockTunnelState {
	links: BTreeMap<String, MockLink>,
	devices: BTreeMap<String, MockDevice>,
	next_index: u32,
	links_added: usize,
	mutations: usize,
	configure_calls: Vec<DeviceConfig>,
	failures: HashSet<MockTunnelOp>,
}

impl MockTunnelState {
	fn take_failure(&mut self, op: MockTunnelOp) -> bool {
		self.failures.remove(&op)
	}

	fn create(&mut self, name: &str) {
		self.next_index += 1;
		let index = self.next_index;
		self.links.insert(
			name.to_string(),
			MockLink {
				index,
				up: false,
				addresses: Vec::new(),
			},
		);
		self.devices.insert(name.to_string(), MockDevice::default());
	}
}

fn injected(op: MockTunnelOp) -> String {
	format!("injected failure for {op:?}")
}

#[derive(Clone, Default)]
pub struct MockTunnel {
	state: Arc<Mutex<MockTunnelState>>,
}

impl MockTunnel {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a link and a fresh device (all-zero key, no peers) named `name`.
	pub fn insert_device(&self, name: &str) {
		self.state.lock().unwrap().create(name);
	}

	/// Add a device that already carries an identity and peers.
	pub fn insert_configured_device(
		&self,
		name: &str,
		private_key: WgPrivateKey,
		peers: Vec<TunnelPeer>,
	) {
		let mut state = self.state.lock().unwrap();
		state.create(name);
		if let Some(device) = state.devices.get_mut(name) {
			device.private_key = Some(private_key);
			device.peers = peers;
		}
	}

	pub fn device_snapshot(&self, name: &str) -> Option<TunnelDevice> {
		let state = self.state.lock().unwrap();
		state.devices.get(name).map(|d| d.snapshot(name))
	}

	pub fn private_key(&self, name: &str) -> Option<WgPrivateKey> {
		let state = self.state.lock().unwrap();
		state.devices.get(name).and_then(|d| d.private_key.clone())
	}

	pub fn link(&self, name: &str) -> Option<MockLink> {
		self.state.lock().unwrap().links.get(name).cloned()
	}

	pub fn links_added(&self) -> usize {
		self.state.lock().unwrap().links_added
	}

	/// Every successful `configure` call, in order.
	pub fn configure_calls(&self) -> Vec<DeviceConfig> {
		self.state.lock().unwrap().configure_calls.clone()
	}

	/// Count of successful state-changing calls of any kind.
	pub fn mutations(&self) -> usize {
		self.state.lock().unwrap().mutations
	}

	pub fn fail_next(&self, op: MockTunnelOp) {
		self.state.lock().unwrap().failures.insert(op);
	}
}

#[async_trait]
impl TunnelControl for MockTunnel {
	async fn devices(&self) -> Result<Vec<TunnelDevice>, TunnelError> {
		let mut state = self.state.lock().unwrap();
		if state.take_failure(MockTunnelOp::ListDevices) {
			return Err(TunnelError::Rejected(injected(MockTunnelOp::ListDevices)));
		}
		Ok(
			state
				.devices
				.iter()
				.map(|(name, device)| device.snapshot(name))
				.collect(),
		)
	}

	async fn device(&self, name: &str) -> Result<TunnelDevice, TunnelError> {
		let mut state = self.state.lock().unwrap();
		if state.take_failure(MockTunnelOp::GetDevice) {
			return Err(TunnelError::Rejected(injected(MockTunnelOp::GetDevice)));
		}
		state
			.devices
			.get(name)
			.map(|d| d.snapshot(name))
			.ok_or_else(|| TunnelError::DeviceNotFound(name.to_string()))
	}

	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<(), TunnelError> {
		let mut state = self.state.lock().unwrap();
		if state.take_failure(MockTunnelOp::Configure) {
			return Err(TunnelError::Rejected(injected(MockTunnelOp::Configure)));
		}
		let device = state
			.devices
			.get_mut(name)
			.ok_or_else(|| TunnelError::DeviceNotFound(name.to_string()))?;
		device.apply(config);
		state.configure_calls.push(config.clone());
		state.mutations += 1;
		Ok(())
	}
}

#[async_trait]
impl LinkControl for MockTunnel {
	async fn add_link(&self, name: &str) -> Result<(), LinkError> {
		let mut state = self.state.lock().unwrap();
		if state.take_failure(MockTunnelOp::AddLink) {
			return Err(LinkError::CommandFailed {
				args: format!("link add dev {name} type wireguard"),
				stderr: injected(MockTunnelOp::AddLink),
			});
		}
		if state.links.contains_key(name) {
			return Err(LinkError::CommandFailed {
				args: format!("link add dev {name} type wireguard"),
				stderr: "RTNETLINK answers: File exists".to_string(),
			});
		}
		state.create(name);
		state.links_added += 1;
		state.mutations += 1;
		Ok(())
	}

	async fn link_by_name(&self, name: &str) -> Result<Option<NetworkLink>, LinkError> {
		let mut state = self.state.lock().unwrap();
		if state.take_failure(MockTunnelOp::LinkByName) {
			return Err(LinkError::CommandFailed {
				args: format!("-j link show dev {name}"),
				stderr: injected(MockTunnelOp::LinkByName),
			});
		}
		Ok(state.links.get(name).map(|link| NetworkLink {
			index: link.index,
			name: name.to_string(),
			up: link.up,
		}))
	}

	async fn replace_address(&self, link: &NetworkLink, address: IpNet) -> Result<(), LinkError> {
		let mut state = self.state.lock().unwrap();
		if state.take_failure(MockTunnelOp::ReplaceAddress) {
			return Err(LinkError::CommandFailed {
				args: format!("address replace {address} dev {}", link.name),
				stderr: injected(MockTunnelOp::ReplaceAddress),
			});
		}
		let entry = state
			.links
			.get_mut(&link.name)
			.ok_or_else(|| LinkError::CommandFailed {
				args: format!("address replace {address} dev {}", link.name),
				stderr: format!("Cannot find device \"{}\"", link.name),
			})?;
		entry.addresses.retain(|a| a.addr() != address.addr());
		entry.addresses.push(address);
		state.mutations += 1;
		Ok(())
	}

	async fn set_up(&self, link: &NetworkLink) -> Result<(), LinkError> {
		let mut state = self.state.lock().unwrap();
		if state.take_failure(MockTunnelOp::SetUp) {
			return Err(LinkError::CommandFailed {
				args: format!("link set dev {} up", link.name),
				stderr: injected(MockTunnelOp::SetUp),
			});
		}
		let entry = state
			.links
			.get_mut(&link.name)
			.ok_or_else(|| LinkError::CommandFailed {
				args: format!("link set dev {} up", link.name),
				stderr: format!("Cannot find device \"{}\"", link.name),
			})?;
		entry.up = true;
		state.mutations += 1;
		Ok(())
	}
}

impl std::fmt::Debug for MockTunnel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock().unwrap();
		f.debug_struct("MockTunnel")
			.field("links", &state.links.keys().collect::<Vec<_>>())
			.field("mutations", &state.mutations)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tunnel::PeerConfig;
	use registrar_wgtunnel_common::WgKeyPair;

	fn peer_update(allowed: &str, replace_allowed_ips: bool) -> (WgKeyPair, PeerConfig) {
		let pair = WgKeyPair::generate();
		let config = PeerConfig {
			public_key: *pair.public_key(),
			preshared_key: None,
			allowed_ips: vec![allowed.parse().unwrap()],
			persistent_keepalive: Some(5),
			replace_allowed_ips,
		};
		(pair, config)
	}

	#[tokio::test]
	async fn replace_address_is_idempotent() {
		let mock = MockTunnel::new();
		mock.insert_device("wg0");
		let link = mock.link_by_name("wg0").await.unwrap().unwrap();
		let addr: IpNet = "10.8.0.0/24".parse().unwrap();

		mock.replace_address(&link, addr).await.unwrap();
		mock.replace_address(&link, addr).await.unwrap();

		assert_eq!(mock.link("wg0").unwrap().addresses, vec![addr]);
	}

	#[tokio::test]
	async fn replace_peers_clears_table() {
		let mock = MockTunnel::new();
		mock.insert_device("wg0");
		let (_, first) = peer_update("10.8.0.2/32", true);
		mock.configure(
			"wg0",
			&DeviceConfig {
				peers: vec![first],
				..Default::default()
			},
		)
		.await
		.unwrap();

		mock.configure(
			"wg0",
			&DeviceConfig {
				private_key: Some(WgPrivateKey::generate()),
				replace_peers: true,
				peers: vec![],
			},
		)
		.await
		.unwrap();

		let device = mock.device_snapshot("wg0").unwrap();
		assert!(device.peers.is_empty());
		assert!(device.identity.is_some());
	}

	#[tokio::test]
	async fn upsert_replaces_allowed_ips_only_when_asked() {
		let mock = MockTunnel::new();
		mock.insert_device("wg0");
		let (_, mut update) = peer_update("10.8.0.2/32", false);
		mock.configure(
			"wg0",
			&DeviceConfig {
				peers: vec![update.clone()],
				..Default::default()
			},
		)
		.await
		.unwrap();

		update.allowed_ips = vec!["10.8.0.3/32".parse().unwrap()];
		mock.configure(
			"wg0",
			&DeviceConfig {
				peers: vec![update.clone()],
				..Default::default()
			},
		)
		.await
		.unwrap();
		assert_eq!(mock.device_snapshot("wg0").unwrap().peers[0].allowed_ips.len(), 2);

		update.replace_allowed_ips = true;
		mock.configure(
			"wg0",
			&DeviceConfig {
				peers: vec![update],
				..Default::default()
			},
		)
		.await
		.unwrap();
		let peers = mock.device_snapshot("wg0").unwrap().peers;
		assert_eq!(peers.len(), 1);
		assert_eq!(peers[0].allowed_ips, vec!["10.8.0.3/32".parse::<IpNet>().unwrap()]);
	}

	#[tokio::test]
	async fn failed_configure_leaves_device_unchanged() {
		let mock = MockTunnel::new();
		mock.insert_device("wg0");
		mock.fail_next(MockTunnelOp::Configure);

		let (_, update) = peer_update("10.8.0.2/32", true);
		let result = mock
			.configure(
				"wg0",
				&DeviceConfig {
					peers: vec![update],
					..Default::default()
				},
			)
			.await;
		assert!(result.is_err());
		assert!(mock.device_snapshot("wg0").unwrap().peers.is_empty());
		assert!(mock.configure_calls().is_empty());
	}
}
