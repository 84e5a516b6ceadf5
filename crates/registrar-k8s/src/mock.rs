// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory control plane for tests.
//!
//! Mirrors the API server behaviors the registrar depends on: creates
//! conflict on existing names, and status writes are compare-and-swap on
//! `resourceVersion`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{ControlPlane, SecretData};
use crate::crd::{WireguardIP, WireguardIPPool, WireguardIPPoolStatus};
use crate::error::{K8sError, K8sResult};

/// Operations on [`MockControlPlane`] that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
	GetPool,
	ReplacePoolStatus,
	GetPeerRequest,
	CreatePeerRequest,
	GetSecret,
	CreateSecret,
}

#[derive(Default)]
struct MockState {
	pools: HashMap<String, WireguardIPPool>,
	peers: HashMap<String, WireguardIP>,
	secrets: BTreeMap<String, SecretData>,
	next_version: u64,
	secret_creates: usize,
	pool_status_writes: usize,
	failures: HashSet<MockOp>,
	racing_secrets: HashMap<String, SecretData>,
}

impl MockState {
	fn bump_version(&mut self) -> String {
		self.next_version += 1;
		self.next_version.to_string()
	}

	fn take_failure(&mut self, op: MockOp) -> K8sResult<()> {
		if self.failures.remove(&op) {
			return Err(K8sError::ApiError {
				message: format!("injected failure for {op:?}"),
			});
		}
		Ok(())
	}
}

#[derive(Clone, Default)]
pub struct MockControlPlane {
	state: Arc<Mutex<MockState>>,
}

impl MockControlPlane {
	pub fn new() -> Self {
		Self::default()
	}

	/// Store a pool as-is, assigning it a fresh resource version.
	pub fn insert_pool(&self, mut pool: WireguardIPPool) {
		let mut state = self.state.lock().unwrap();
		pool.metadata.resource_version = Some(state.bump_version());
		state.pools.insert(pool.name().to_string(), pool);
	}

	pub fn pool(&self, name: &str) -> Option<WireguardIPPool> {
		self.state.lock().unwrap().pools.get(name).cloned()
	}

	pub fn insert_peer_request(&self, request: WireguardIP) {
		let mut state = self.state.lock().unwrap();
		state.peers.insert(request.name().to_string(), request);
	}

	pub fn insert_secret(&self, name: &str, data: SecretData) {
		self
			.state
			.lock()
			.unwrap()
			.secrets
			.insert(name.to_string(), data);
	}

	pub fn secret(&self, name: &str) -> Option<SecretData> {
		self.state.lock().unwrap().secrets.get(name).cloned()
	}

	pub fn secret_names(&self) -> Vec<String> {
		self.state.lock().unwrap().secrets.keys().cloned().collect()
	}

	/// Number of successful `create_secret` calls.
	pub fn secret_creates(&self) -> usize {
		self.state.lock().unwrap().secret_creates
	}

	/// Number of successful `replace_pool_status` calls.
	pub fn pool_status_writes(&self) -> usize {
		self.state.lock().unwrap().pool_status_writes
	}

	/// Make the next call of `op` fail with an API error.
	pub fn fail_next(&self, op: MockOp) {
		self.state.lock().unwrap().failures.insert(op);
	}

	/// Make `data` appear under `name` just before the next `create_secret`
	/// for that name, as if another writer created it first.
	pub fn concurrent_secret_create(&self, name: &str, data: SecretData) {
		self
			.state
			.lock()
			.unwrap()
			.racing_secrets
			.insert(name.to_string(), data);
	}

	/// Simulate another writer updating the pool status, which invalidates
	/// every copy of the pool read before this call.
	pub fn concurrent_status_write(&self, name: &str, status: WireguardIPPoolStatus) {
		let mut state = self.state.lock().unwrap();
		let version = state.bump_version();
		if let Some(pool) = state.pools.get_mut(name) {
			pool.status = Some(status);
			pool.metadata.resource_version = Some(version);
		}
	}
}

#[async_trait]
impl ControlPlane for MockControlPlane {
	async fn get_pool(&self, name: &str) -> K8sResult<WireguardIPPool> {
		let mut state = self.state.lock().unwrap();
		state.take_failure(MockOp::GetPool)?;
		state.pools.get(name).cloned().ok_or_else(|| K8sError::NotFound {
			kind: "WireguardIPPool",
			name: name.to_string(),
		})
	}

	async fn replace_pool_status(&self, pool: &WireguardIPPool) -> K8sResult<WireguardIPPool> {
		let mut state = self.state.lock().unwrap();
		state.take_failure(MockOp::ReplacePoolStatus)?;

		let name = pool
			.metadata
			.name
			.clone()
			.ok_or(K8sError::MissingName {
				kind: "WireguardIPPool",
			})?;
		let stored_version = match state.pools.get(&name) {
			Some(stored) => stored.metadata.resource_version.clone(),
			None => {
				return Err(K8sError::NotFound {
					kind: "WireguardIPPool",
					name,
				})
			}
		};
		if pool.metadata.resource_version.is_some()
			&& pool.metadata.resource_version != stored_version
		{
			return Err(K8sError::Conflict {
				kind: "WireguardIPPool",
				name,
			});
		}

		let version = state.bump_version();
		state.pool_status_writes += 1;
		let stored = state
			.pools
			.get_mut(&name)
			.ok_or_else(|| K8sError::NotFound {
				kind: "WireguardIPPool",
				name: name.clone(),
			})?;
		stored.status = pool.status.clone();
		stored.metadata.resource_version = Some(version);
		Ok(stored.clone())
	}

	async fn get_peer_request(&self, name: &str) -> K8sResult<WireguardIP> {
		let mut state = self.state.lock().unwrap();
		state.take_failure(MockOp::GetPeerRequest)?;
		state.peers.get(name).cloned().ok_or_else(|| K8sError::NotFound {
			kind: "WireguardIP",
			name: name.to_string(),
		})
	}

	async fn create_peer_request(&self, request: &WireguardIP) -> K8sResult<WireguardIP> {
		let mut state = self.state.lock().unwrap();
		state.take_failure(MockOp::CreatePeerRequest)?;
		let name = request.name().to_string();
		if state.peers.contains_key(&name) {
			return Err(K8sError::Conflict {
				kind: "WireguardIP",
				name,
			});
		}
		let mut created = request.clone();
		created.metadata.resource_version = Some(state.bump_version());
		state.peers.insert(name, created.clone());
		Ok(created)
	}

	async fn get_secret(&self, name: &str) -> K8sResult<SecretData> {
		let mut state = self.state.lock().unwrap();
		state.take_failure(MockOp::GetSecret)?;
		state.secrets.get(name).cloned().ok_or_else(|| K8sError::NotFound {
			kind: "Secret",
			name: name.to_string(),
		})
	}

	async fn create_secret(&self, name: &str, data: SecretData) -> K8sResult<()> {
		let mut state = self.state.lock().unwrap();
		state.take_failure(MockOp::CreateSecret)?;
		if let Some(winner) = state.racing_secrets.remove(name) {
			state.secrets.insert(name.to_string(), winner);
		}
		if state.secrets.contains_key(name) {
			return Err(K8sError::Conflict {
				kind: "Secret",
				name: name.to_string(),
			});
		}
		state.secrets.insert(name.to_string(), data);
		state.secret_creates += 1;
		Ok(())
	}
}

impl std::fmt::Debug for MockControlPlane {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock().unwrap();
		f.debug_struct("MockControlPlane")
			.field("pools", &state.pools.len())
			.field("peers", &state.peers.len())
			.field("secrets", &state.secrets.len())
			.finish()
	}
}
