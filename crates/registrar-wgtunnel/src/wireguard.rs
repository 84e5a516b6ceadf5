// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use ipnet::IpNet;
use registrar_k8s::{ControlPlane, WireguardIP, WireguardIPPool};
use registrar_wgtunnel_device::{
	discover_or_create, IpCommandLinks, KernelTunnel, LinkControl, NetworkLink, TunnelControl,
};
use tracing::{debug, info, instrument, warn};

use crate::config::RegistrarConfig;
use crate::error::{RegistrarError, Result};
use crate::identity::{ensure_identity, IdentityState};
use crate::registrar::{register_peer, PeerDescriptor};

/// Handle on the host's WireGuard server interface.
///
/// Exactly one WireGuard device may exist on the host; [`Wireguard::new`]
/// binds to it (or creates it) and fails if there are several. Operations
/// that change the server identity take `&mut self`, so callers sharing a
/// handle across tasks have to serialize access themselves.
pub struct Wireguard {
	control_plane: Arc<dyn ControlPlane>,
	links: Arc<dyn LinkControl>,
	tunnel: Arc<dyn TunnelControl>,
	config: RegistrarConfig,
	device_name: String,
	link: NetworkLink,
	identity: IdentityState,
}

impl Wireguard {
	#[instrument(skip(control_plane, links, tunnel, config), fields(interface = %config.interface_name))]
	pub async fn new(
		control_plane: Arc<dyn ControlPlane>,
		links: Arc<dyn LinkControl>,
		tunnel: Arc<dyn TunnelControl>,
		config: RegistrarConfig,
	) -> Result<Self> {
		let (device, link) =
			discover_or_create(tunnel.as_ref(), links.as_ref(), &config.interface_name).await?;
		let identity = IdentityState::from_device(&device);

		info!(
			device = %device.name,
			link_index = link.index,
			peers = device.peers.len(),
			initialized = identity.is_initialized(),
			"bound wireguard device"
		);

		Ok(Self {
			control_plane,
			links,
			tunnel,
			config,
			device_name: device.name,
			link,
			identity,
		})
	}

	/// Bind using the host's `ip` binary and kernel WireGuard interface.
	pub async fn with_host_network(
		control_plane: Arc<dyn ControlPlane>,
		config: RegistrarConfig,
	) -> Result<Self> {
		Self::new(
			control_plane,
			Arc::new(IpCommandLinks::new()),
			Arc::new(KernelTunnel::new()),
			config,
		)
		.await
	}

	pub fn device_name(&self) -> &str {
		&self.device_name
	}

	pub fn link(&self) -> &NetworkLink {
		&self.link
	}

	pub fn identity(&self) -> IdentityState {
		self.identity
	}

	pub fn config(&self) -> &RegistrarConfig {
		&self.config
	}

	/// Bring the server up for `pool`.
	///
	/// Installs the pool's persisted identity if the device has none yet,
	/// then (re)applies the pool address to the link and sets it up. The
	/// address step runs on every call. `pool` is updated in place when its
	/// status changes.
	#[instrument(skip(self, pool), fields(device = %self.device_name, pool = pool.name(), cidr = %pool.spec.cidr))]
	pub async fn start_server(&mut self, pool: &mut WireguardIPPool) -> Result<()> {
		let address: IpNet = pool
			.spec
			.cidr
			.trim()
			.parse()
			.map_err(|source| RegistrarError::InvalidCidr {
				cidr: pool.spec.cidr.clone(),
				source,
			})?;

		if let IdentityState::Uninitialized = self.identity {
			let public_key = ensure_identity(
				self.control_plane.as_ref(),
				self.tunnel.as_ref(),
				&self.device_name,
				pool,
			)
			.await?;
			self.identity = IdentityState::Initialized(public_key);
		} else {
			debug!("server identity already installed");
		}

		self
			.links
			.replace_address(&self.link, address)
			.await
			.map_err(RegistrarError::link("failed to assign pool address"))?;
		self
			.links
			.set_up(&self.link)
			.await
			.map_err(RegistrarError::link("failed to bring link up"))?;
		self.link.up = true;

		info!(%address, "server started");
		Ok(())
	}

	/// Admit a new peer at the address carried by `request`.
	#[instrument(skip(self, request), fields(device = %self.device_name, request = request.name()))]
	pub async fn register(&self, request: &WireguardIP) -> Result<PeerDescriptor> {
		if !self.identity.is_initialized() {
			warn!("registering a peer before the server identity is installed");
		}
		register_peer(
			self.tunnel.as_ref(),
			&self.device_name,
			request,
			self.config.peer_prefix_len,
		)
		.await
	}
}

impl std::fmt::Debug for Wireguard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Wireguard")
			.field("device_name", &self.device_name)
			.field("link", &self.link)
			.field("identity", &self.identity)
			.field("config", &self.config)
			.finish()
	}
}
