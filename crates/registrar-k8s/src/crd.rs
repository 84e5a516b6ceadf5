// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Custom resources read and written by the registrar.
//!
//! A `WireguardIPPool` describes the address space served by the tunnel and
//! points at the secret holding the server's private key. A `WireguardIP`
//! carries one address the cluster assigned to a new peer.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Address space and identity binding for one tunnel deployment.
///
/// Example:
/// ```yaml
/// apiVersion: registrar.wgtunnel.dev/v1alpha1
/// kind: WireguardIPPool
/// metadata:
///   name: home
/// spec:
///   cidr: 10.8.0.0/24
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
	group = "registrar.wgtunnel.dev",
	version = "v1alpha1",
	kind = "WireguardIPPool",
	namespaced,
	status = "WireguardIPPoolStatus",
	printcolumn = r#"{"name":"CIDR","type":"string","jsonPath":".spec.cidr"}"#,
	printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".status.secretRef"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WireguardIPPoolSpec {
	/// Pool address in CIDR notation. The address part is assigned to the
	/// tunnel link, the prefix length becomes its netmask.
	pub cidr: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireguardIPPoolStatus {
	/// Name of the secret holding the server private key. Empty until the
	/// server identity has been created.
	#[serde(default)]
	pub secret_ref: String,

	#[serde(default)]
	pub created: bool,
}

impl WireguardIPPool {
	pub fn secret_ref(&self) -> Option<&str> {
		self
			.status
			.as_ref()
			.map(|s| s.secret_ref.as_str())
			.filter(|s| !s.is_empty())
	}

	pub fn name(&self) -> &str {
		self.metadata.name.as_deref().unwrap_or_default()
	}
}

/// A single address handed to a peer that wants to join the tunnel.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
	group = "registrar.wgtunnel.dev",
	version = "v1alpha1",
	kind = "WireguardIP",
	namespaced,
	printcolumn = r#"{"name":"Address","type":"string","jsonPath":".spec.ipAddress"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WireguardIPSpec {
	pub ip_address: String,
}

impl WireguardIP {
	pub fn name(&self) -> &str {
		self.metadata.name.as_deref().unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kube::Resource;

	#[test]
	fn pool_secret_ref_empty_until_set() {
		let mut pool = WireguardIPPool::new(
			"home",
			WireguardIPPoolSpec {
				cidr: "10.8.0.0/24".to_string(),
			},
		);
		assert!(pool.secret_ref().is_none());

		pool.status = Some(WireguardIPPoolStatus::default());
		assert!(pool.secret_ref().is_none());

		pool.status = Some(WireguardIPPoolStatus {
			secret_ref: "wgipp-home".to_string(),
			created: true,
		});
		assert_eq!(pool.secret_ref(), Some("wgipp-home"));
	}

	#[test]
	fn pool_status_uses_camel_case() {
		let status = WireguardIPPoolStatus {
			secret_ref: "wgipp-home".to_string(),
			created: true,
		};
		let json = serde_json::to_value(&status).unwrap();
		assert_eq!(json["secretRef"], "wgipp-home");
		assert_eq!(json["created"], true);
	}

	#[test]
	fn peer_request_deserializes_from_manifest() {
		let json = r#"{
			"apiVersion": "registrar.wgtunnel.dev/v1alpha1",
			"kind": "WireguardIP",
			"metadata": {"name": "node-a"},
			"spec": {"ipAddress": "10.8.0.5"}
		}"#;
		let ip: WireguardIP = serde_json::from_str(json).unwrap();
		assert_eq!(ip.name(), "node-a");
		assert_eq!(ip.spec.ip_address, "10.8.0.5");
	}

	#[test]
	fn api_group_and_kind() {
		assert_eq!(WireguardIPPool::group(&()), "registrar.wgtunnel.dev");
		assert_eq!(WireguardIPPool::kind(&()), "WireguardIPPool");
		assert_eq!(WireguardIP::version(&()), "v1alpha1");
	}
}
