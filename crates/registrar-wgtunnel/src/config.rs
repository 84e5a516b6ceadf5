// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::ConfigError;

pub const DEFAULT_INTERFACE_NAME: &str = "wg0";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Linux IFNAMSIZ minus the trailing NUL.
const MAX_INTERFACE_NAME_LEN: usize = 15;

fn validate_interface_name(name: &str) -> Result<(), ConfigError> {
	let valid = !name.is_empty()
		&& name.len() <= MAX_INTERFACE_NAME_LEN
		&& !name.contains('/')
		&& !name.chars().any(char::is_whitespace);
	if !valid {
		return Err(ConfigError::InvalidInterfaceName(name.to_string()));
	}
	Ok(())
}

fn validate_prefix_len(prefix_len: u8) -> Result<(), ConfigError> {
	if prefix_len > 128 {
		return Err(ConfigError::InvalidPrefixLen(prefix_len));
	}
	Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarConfig {
	/// Name given to the WireGuard link when none exists yet.
	pub interface_name: String,
	/// Namespace holding pools, peer requests and key secrets.
	pub namespace: String,
	/// Prefix length of each peer's allowed address. `None` means a host
	/// route (/32 or /128).
	pub peer_prefix_len: Option<u8>,
}

impl RegistrarConfig {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let interface_name =
			lookup("REGISTRAR_WG_INTERFACE").unwrap_or_else(|| DEFAULT_INTERFACE_NAME.to_string());
		validate_interface_name(&interface_name)?;

		let namespace = lookup("REGISTRAR_NAMESPACE")
			.filter(|s| !s.is_empty())
			.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

		let peer_prefix_len = lookup("REGISTRAR_PEER_PREFIX_LEN")
			.filter(|s| !s.is_empty())
			.map(|s| {
				s.parse::<u8>()
					.map_err(|e| ConfigError::Parse(format!("invalid REGISTRAR_PEER_PREFIX_LEN: {e}")))
			})
			.transpose()?;
		if let Some(len) = peer_prefix_len {
			validate_prefix_len(len)?;
		}

		Ok(Self {
			interface_name,
			namespace,
			peer_prefix_len,
		})
	}

	pub fn new(interface_name: impl Into<String>) -> Result<Self, ConfigError> {
		let interface_name = interface_name.into();
		validate_interface_name(&interface_name)?;
		Ok(Self {
			interface_name,
			namespace: DEFAULT_NAMESPACE.to_string(),
			peer_prefix_len: None,
		})
	}

	pub fn with_interface_name(mut self, name: impl Into<String>) -> Result<Self, ConfigError> {
		let name = name.into();
		validate_interface_name(&name)?;
		self.interface_name = name;
		Ok(self)
	}

	pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = namespace.into();
		self
	}

	pub fn with_peer_prefix_len(mut self, prefix_len: u8) -> Result<Self, ConfigError> {
		validate_prefix_len(prefix_len)?;
		self.peer_prefix_len = Some(prefix_len);
		Ok(self)
	}
}

impl Default for RegistrarConfig {
	fn default() -> Self {
		Self {
			interface_name: DEFAULT_INTERFACE_NAME.to_string(),
			namespace: DEFAULT_NAMESPACE.to_string(),
			peer_prefix_len: None,
		}
	}
}
