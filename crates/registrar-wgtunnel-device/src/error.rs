// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
	#[error("ip command not found in PATH")]
	IpNotInstalled,

	#[error("`ip {args}` failed: {stderr}")]
	CommandFailed { args: String, stderr: String },

	#[error("link not found: {0}")]
	NotFound(String),

	#[error("failed to parse ip output: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TunnelError {
	#[error("invalid interface name: {0}")]
	InvalidInterfaceName(String),

	#[error("wireguard device not found: {0}")]
	DeviceNotFound(String),

	#[error("failed to list wireguard devices: {0}")]
	List(#[source] std::io::Error),

	#[error("failed to read wireguard device {name}: {source}")]
	Read {
		name: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to configure wireguard device {name}: {source}")]
	Configure {
		name: String,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid key reported for device {0}")]
	InvalidKey(String),

	#[error("blocking task failed: {0}")]
	Join(#[from] tokio::task::JoinError),

	#[error("{0}")]
	Rejected(String),
}

#[derive(Debug, Error)]
pub enum DeviceError {
	#[error("found {} wireguard devices ({}), only one is supported", .names.len(), .names.join(", "))]
	Ambiguous { names: Vec<String> },

	#[error("link error: {0}")]
	Link(#[from] LinkError),

	#[error("tunnel error: {0}")]
	Tunnel(#[from] TunnelError),
}
