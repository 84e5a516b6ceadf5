// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server identity: a private key persisted in a K8s secret and installed on
//! the WireGuard device.
//!
//! The secret is named after the pool (`wgipp-<pool>`) so that a retried or
//! racing initialization finds the key an earlier attempt stored instead of
//! generating another one.

use registrar_common_secret::Secret;
use registrar_k8s::{ControlPlane, K8sError, SecretData, WireguardIPPool, WireguardIPPoolStatus};
use registrar_wgtunnel_common::{KeyError, WgPrivateKey, WgPublicKey};
use registrar_wgtunnel_device::{DeviceConfig, TunnelControl, TunnelDevice};
use tracing::{debug, info, instrument};

use crate::error::{RegistrarError, Result};

pub const SECRET_PREFIX: &str = "wgipp-";
pub const SECRET_KEY: &str = "privk";

/// Whether the device already carries a server identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityState {
	/// The device still has the all-zero key it was created with.
	Uninitialized,
	Initialized(WgPublicKey),
}

impl IdentityState {
	pub fn from_device(device: &TunnelDevice) -> Self {
		match device.identity {
			Some(public_key) => IdentityState::Initialized(public_key),
			None => IdentityState::Uninitialized,
		}
	}

	pub fn is_initialized(&self) -> bool {
		matches!(self, IdentityState::Initialized(_))
	}

	pub fn public_key(&self) -> Option<&WgPublicKey> {
		match self {
			IdentityState::Initialized(key) => Some(key),
			IdentityState::Uninitialized => None,
		}
	}
}

pub fn secret_name(pool_name: &str) -> String {
	format!("{SECRET_PREFIX}{pool_name}")
}

fn encode_secret(key: &WgPrivateKey) -> SecretData {
	let mut data = SecretData::new();
	data.insert(
		SECRET_KEY.to_string(),
		Secret::new(key.to_base64().expose().as_bytes().to_vec()),
	);
	data
}

/// Parse the private key stored under [`SECRET_KEY`].
pub fn decode_secret(secret: &str, data: &SecretData) -> Result<WgPrivateKey> {
	let bytes = data
		.get(SECRET_KEY)
		.ok_or_else(|| RegistrarError::SecretKeyMissing {
			secret: secret.to_string(),
			key: SECRET_KEY,
		})?;
	let encoded = Secret::new(String::from_utf8_lossy(bytes.expose()).into_owned());
	let key = WgPrivateKey::from_base64(encoded.expose())
		.map_err(RegistrarError::key_format("failed to parse server private key"))?;
	if key.is_zero() {
		return Err(RegistrarError::key_format("stored server private key is unusable")(
			KeyError::Zero,
		));
	}
	Ok(key)
}

/// Make sure a key secret named `name` exists. Returns `true` if this call
/// created it.
#[instrument(skip(control_plane))]
async fn ensure_secret(control_plane: &dyn ControlPlane, name: &str) -> Result<bool> {
	match control_plane.get_secret(name).await {
		Ok(_) => {
			info!("reusing existing server key secret");
			return Ok(false);
		}
		Err(e) if e.is_not_found() => {}
		Err(e) => {
			return Err(RegistrarError::control_plane(
				"failed to look up server key secret",
			)(e))
		}
	}

	let key = WgPrivateKey::generate();
	match control_plane.create_secret(name, encode_secret(&key)).await {
		Ok(()) => {
			info!("stored new server key secret");
			Ok(true)
		}
		Err(e) if e.is_conflict() => {
			info!("server key secret created concurrently, adopting it");
			Ok(false)
		}
		Err(e) => Err(RegistrarError::control_plane(
			"failed to store server key secret",
		)(e)),
	}
}

/// Point `pool.status.secretRef` at the deterministic secret, creating the
/// secret first if needed.
///
/// The status write is conditional on the pool's resource version. Losing
/// that race to a writer that already set a secret reference counts as
/// success, and `pool` is replaced with the winner's copy.
async fn bind_secret(control_plane: &dyn ControlPlane, pool: &mut WireguardIPPool) -> Result<()> {
	let pool_name = pool.metadata.name.clone().ok_or_else(|| {
		RegistrarError::control_plane("pool has no name")(K8sError::MissingName {
			kind: "WireguardIPPool",
		})
	})?;
	let name = secret_name(&pool_name);

	ensure_secret(control_plane, &name).await?;

	let mut desired = pool.clone();
	desired.status = Some(WireguardIPPoolStatus {
		secret_ref: name,
		created: true,
	});

	match control_plane.replace_pool_status(&desired).await {
		Ok(updated) => {
			debug!("pool status now references server key secret");
			*pool = updated;
			Ok(())
		}
		Err(e) if e.is_conflict() => {
			let current = control_plane
				.get_pool(&pool_name)
				.await
				.map_err(RegistrarError::control_plane("failed to re-read pool"))?;
			if current.secret_ref().is_none() {
				return Err(RegistrarError::control_plane(
					"pool changed while binding server key secret",
				)(e));
			}
			info!(
				secret_ref = current.secret_ref().unwrap_or_default(),
				"pool was initialized concurrently, adopting its secret"
			);
			*pool = current;
			Ok(())
		}
		Err(e) => Err(RegistrarError::control_plane(
			"failed to update pool status",
		)(e)),
	}
}

/// Install the pool's persisted server key on `device_name`, creating and
/// recording the key first if the pool has none.
///
/// Installing an identity replaces the device's whole peer table; every peer
/// has to register again afterwards.
#[instrument(skip(control_plane, tunnel, pool), fields(pool = pool.metadata.name.as_deref().unwrap_or_default()))]
pub async fn ensure_identity(
	control_plane: &dyn ControlPlane,
	tunnel: &dyn TunnelControl,
	device_name: &str,
	pool: &mut WireguardIPPool,
) -> Result<WgPublicKey> {
	if pool.secret_ref().is_none() {
		bind_secret(control_plane, pool).await?;
	}

	let secret_ref = pool.secret_ref().unwrap_or_default().to_string();
	let data = control_plane
		.get_secret(&secret_ref)
		.await
		.map_err(RegistrarError::control_plane("failed to fetch server key secret"))?;
	let private_key = decode_secret(&secret_ref, &data)?;
	let public_key = private_key.public_key();

	let config = DeviceConfig {
		private_key: Some(private_key),
		replace_peers: true,
		peers: Vec::new(),
	};
	tunnel
		.configure(device_name, &config)
		.await
		.map_err(RegistrarError::device_config("failed to install server identity"))?;

	info!(%public_key, %secret_ref, "server identity installed");
	Ok(public_key)
}

#[cfg(test)]
mod tests {
	use super::*;
	use registrar_k8s::{MockControlPlane, MockOp, WireguardIPPoolSpec};
	use registrar_wgtunnel_device::MockTunnel;

	fn pool(name: &str) -> WireguardIPPool {
		WireguardIPPool::new(
			name,
			WireguardIPPoolSpec {
				cidr: "10.8.0.0/24".to_string(),
			},
		)
	}

	#[test]
	fn secret_name_uses_prefix() {
		assert_eq!(secret_name("home"), "wgipp-home");
	}

	#[test]
	fn identity_state_from_device() {
		let mut device = TunnelDevice {
			name: "wg0".to_string(),
			identity: None,
			peers: Vec::new(),
		};
		assert_eq!(IdentityState::from_device(&device), IdentityState::Uninitialized);

		let key = WgPrivateKey::generate().public_key();
		device.identity = Some(key);
		let state = IdentityState::from_device(&device);
		assert!(state.is_initialized());
		assert_eq!(state.public_key(), Some(&key));
	}

	#[test]
	fn decode_rejects_missing_entry() {
		let err = decode_secret("wgipp-home", &SecretData::new()).unwrap_err();
		assert!(matches!(err, RegistrarError::SecretKeyMissing { .. }));
	}

	#[test]
	fn decode_rejects_garbage() {
		let mut data = SecretData::new();
		data.insert(SECRET_KEY.to_string(), Secret::new(b"not a key".to_vec()));
		let err = decode_secret("wgipp-home", &data).unwrap_err();
		assert!(matches!(err, RegistrarError::KeyFormat { .. }));
	}

	#[test]
	fn decode_rejects_zero_key() {
		let mut data = SecretData::new();
		data.insert(
			SECRET_KEY.to_string(),
			Secret::new(b"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_vec()),
		);
		let err = decode_secret("wgipp-home", &data).unwrap_err();
		assert!(matches!(
			err,
			RegistrarError::KeyFormat {
				source: KeyError::Zero,
				..
			}
		));
	}

	#[test]
	fn encode_then_decode_preserves_key() {
		let key = WgPrivateKey::generate();
		let decoded = decode_secret("s", &encode_secret(&key)).unwrap();
		assert_eq!(decoded, key);
	}

	#[tokio::test]
	async fn reuses_secret_left_by_failed_attempt() {
		let control_plane = MockControlPlane::new();
		let tunnel = MockTunnel::new();
		tunnel.insert_device("wg0");
		control_plane.insert_pool(pool("home"));

		let orphan = WgPrivateKey::generate();
		control_plane.insert_secret("wgipp-home", encode_secret(&orphan));

		let mut current = control_plane.get_pool("home").await.unwrap();
		let public_key = ensure_identity(&control_plane, &tunnel, "wg0", &mut current)
			.await
			.unwrap();

		assert_eq!(public_key, orphan.public_key());
		assert_eq!(control_plane.secret_creates(), 0);
		assert_eq!(current.secret_ref(), Some("wgipp-home"));
	}

	#[tokio::test]
	async fn pool_update_failure_is_control_plane_error() {
		let control_plane = MockControlPlane::new();
		let tunnel = MockTunnel::new();
		tunnel.insert_device("wg0");
		control_plane.insert_pool(pool("home"));
		control_plane.fail_next(MockOp::ReplacePoolStatus);

		let mut current = control_plane.get_pool("home").await.unwrap();
		let err = ensure_identity(&control_plane, &tunnel, "wg0", &mut current)
			.await
			.unwrap_err();

		assert!(matches!(err, RegistrarError::ControlPlane { .. }));
		// The secret survives and is picked up by the next attempt.
		assert_eq!(control_plane.secret_names(), vec!["wgipp-home".to_string()]);
		assert!(tunnel.device_snapshot("wg0").unwrap().identity.is_none());

		let mut current = control_plane.get_pool("home").await.unwrap();
		ensure_identity(&control_plane, &tunnel, "wg0", &mut current)
			.await
			.unwrap();
		assert_eq!(control_plane.secret_creates(), 1);
	}

	#[tokio::test]
	async fn missing_referenced_secret_is_control_plane_error() {
		let control_plane = MockControlPlane::new();
		let tunnel = MockTunnel::new();
		tunnel.insert_device("wg0");

		let mut referenced = pool("home");
		referenced.status = Some(WireguardIPPoolStatus {
			secret_ref: "gone".to_string(),
			created: true,
		});
		control_plane.insert_pool(referenced);

		let mut current = control_plane.get_pool("home").await.unwrap();
		let err = ensure_identity(&control_plane, &tunnel, "wg0", &mut current)
			.await
			.unwrap_err();
		match err {
			RegistrarError::ControlPlane { source, .. } => assert!(source.is_not_found()),
			other => panic!("expected ControlPlane, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn secret_created_concurrently_is_adopted() {
		let control_plane = MockControlPlane::new();
		let tunnel = MockTunnel::new();
		tunnel.insert_device("wg0");
		control_plane.insert_pool(pool("home"));

		let winner = WgPrivateKey::generate();
		control_plane.concurrent_secret_create("wgipp-home", encode_secret(&winner));

		let mut current = control_plane.get_pool("home").await.unwrap();
		let public_key = ensure_identity(&control_plane, &tunnel, "wg0", &mut current)
			.await
			.unwrap();

		assert_eq!(public_key, winner.public_key());
		assert_eq!(control_plane.secret_creates(), 0);
		assert_eq!(tunnel.private_key("wg0"), Some(winner));
		assert_eq!(current.secret_ref(), Some("wgipp-home"));
	}

	#[tokio::test]
	async fn secret_write_failure_is_control_plane_error() {
		let control_plane = MockControlPlane::new();
		let tunnel = MockTunnel::new();
		tunnel.insert_device("wg0");
		control_plane.insert_pool(pool("home"));
		control_plane.fail_next(MockOp::CreateSecret);

		let mut current = control_plane.get_pool("home").await.unwrap();
		let err = ensure_identity(&control_plane, &tunnel, "wg0", &mut current)
			.await
			.unwrap_err();

		assert!(matches!(err, RegistrarError::ControlPlane { .. }));
		assert!(control_plane.secret_names().is_empty());
		assert_eq!(control_plane.pool_status_writes(), 0);
		assert!(current.secret_ref().is_none());
		assert!(tunnel.configure_calls().is_empty());
	}

	#[tokio::test]
	async fn secret_lookup_failure_is_control_plane_error() {
		let control_plane = MockControlPlane::new();
		let tunnel = MockTunnel::new();
		tunnel.insert_device("wg0");
		control_plane.insert_pool(pool("home"));
		control_plane.fail_next(MockOp::GetSecret);

		let mut current = control_plane.get_pool("home").await.unwrap();
		let err = ensure_identity(&control_plane, &tunnel, "wg0", &mut current)
			.await
			.unwrap_err();

		match err {
			RegistrarError::ControlPlane { source, .. } => {
				assert!(!source.is_not_found());
				assert!(!source.is_conflict());
			}
			other => panic!("expected ControlPlane, got {other:?}"),
		}
		assert_eq!(control_plane.secret_creates(), 0);
		assert_eq!(control_plane.pool_status_writes(), 0);
		assert!(tunnel.configure_calls().is_empty());
	}
}
