// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;

use registrar_k8s::K8sError;
use registrar_wgtunnel_common::KeyError;
use registrar_wgtunnel_device::{DeviceError, LinkError, TunnelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrarError {
	#[error("found {} wireguard devices ({}), only one is supported", .names.len(), .names.join(", "))]
	AmbiguousDevice { names: Vec<String> },

	#[error("{context}: {source}")]
	Link {
		context: &'static str,
		#[source]
		source: LinkError,
	},

	#[error("{context}: {source}")]
	ControlPlane {
		context: &'static str,
		#[source]
		source: K8sError,
	},

	#[error("{context}: {source}")]
	KeyFormat {
		context: &'static str,
		#[source]
		source: KeyError,
	},

	#[error("secret {secret} has no {key} entry")]
	SecretKeyMissing { secret: String, key: &'static str },

	#[error("{context}: {source}")]
	DeviceConfig {
		context: &'static str,
		#[source]
		source: TunnelError,
	},

	#[error("invalid pool CIDR {cidr:?}: {source}")]
	InvalidCidr {
		cidr: String,
		#[source]
		source: ipnet::AddrParseError,
	},

	#[error("invalid peer address {address:?}: {source}")]
	InvalidAddress {
		address: String,
		#[source]
		source: std::net::AddrParseError,
	},

	#[error("prefix length {prefix_len} is too long for {address}")]
	InvalidPrefixLen { address: IpAddr, prefix_len: u8 },
}

impl RegistrarError {
	pub(crate) fn link(context: &'static str) -> impl FnOnce(LinkError) -> Self {
		move |source| RegistrarError::Link { context, source }
	}

	pub(crate) fn control_plane(context: &'static str) -> impl FnOnce(K8sError) -> Self {
		move |source| RegistrarError::ControlPlane { context, source }
	}

	pub(crate) fn key_format(context: &'static str) -> impl FnOnce(KeyError) -> Self {
		move |source| RegistrarError::KeyFormat { context, source }
	}

	pub(crate) fn device_config(context: &'static str) -> impl FnOnce(TunnelError) -> Self {
		move |source| RegistrarError::DeviceConfig { context, source }
	}
}

impl From<DeviceError> for RegistrarError {
	fn from(err: DeviceError) -> Self {
		match err {
			DeviceError::Ambiguous { names } => RegistrarError::AmbiguousDevice { names },
			DeviceError::Link(source) => RegistrarError::Link {
				context: "failed to bind wireguard link",
				source,
			},
			DeviceError::Tunnel(source) => RegistrarError::DeviceConfig {
				context: "failed to read wireguard device",
				source,
			},
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid interface name {0:?}: must be 1 to 15 bytes without '/' or whitespace")]
	InvalidInterfaceName(String),

	#[error("invalid peer prefix length {0}: must be at most 128")]
	InvalidPrefixLen(u8),

	#[error("parse error: {0}")]
	Parse(String),
}

pub type Result<T> = std::result::Result<T, RegistrarError>;
