// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::PostParams;
use kube::{Api, Client};
use registrar_common_secret::Secret as SecretValue;
use tracing::{debug, instrument};

use crate::crd::{WireguardIP, WireguardIPPool};
use crate::error::{K8sError, K8sResult};

/// Decoded contents of a K8s secret, one entry per data key.
pub type SecretData = BTreeMap<String, SecretValue<Vec<u8>>>;

const POOL_KIND: &str = "WireguardIPPool";
const PEER_KIND: &str = "WireguardIP";
const SECRET_KIND: &str = "Secret";

/// Trait abstracting the control-plane calls the registrar makes.
///
/// Every write is conditional the way the API server makes it conditional:
/// creates fail with [`K8sError::Conflict`] if the object exists, and status
/// replacement fails with [`K8sError::Conflict`] when the object's
/// `resourceVersion` is stale.
#[async_trait]
pub trait ControlPlane: Send + Sync {
	async fn get_pool(&self, name: &str) -> K8sResult<WireguardIPPool>;

	/// Write `pool.status`, guarded by `pool.metadata.resource_version`.
	async fn replace_pool_status(&self, pool: &WireguardIPPool) -> K8sResult<WireguardIPPool>;

	async fn get_peer_request(&self, name: &str) -> K8sResult<WireguardIP>;

	async fn create_peer_request(&self, request: &WireguardIP) -> K8sResult<WireguardIP>;

	async fn get_secret(&self, name: &str) -> K8sResult<SecretData>;

	async fn create_secret(&self, name: &str, data: SecretData) -> K8sResult<()>;
}

/// Control plane backed by a real K8s API server.
pub struct KubeControlPlane {
	client: Client,
	namespace: String,
}

impl KubeControlPlane {
	pub fn new(client: Client, namespace: impl Into<String>) -> Self {
		Self {
			client,
			namespace: namespace.into(),
		}
	}

	/// Build a client from the ambient kubeconfig or in-cluster service account.
	pub async fn try_default(namespace: impl Into<String>) -> K8sResult<Self> {
		let client = Client::try_default().await?;
		Ok(Self::new(client, namespace))
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	fn pools(&self) -> Api<WireguardIPPool> {
		Api::namespaced(self.client.clone(), &self.namespace)
	}

	fn peers(&self) -> Api<WireguardIP> {
		Api::namespaced(self.client.clone(), &self.namespace)
	}

	fn secrets(&self) -> Api<Secret> {
		Api::namespaced(self.client.clone(), &self.namespace)
	}
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
	#[instrument(skip(self), fields(namespace = %self.namespace))]
	async fn get_pool(&self, name: &str) -> K8sResult<WireguardIPPool> {
		self
			.pools()
			.get(name)
			.await
			.map_err(|e| K8sError::from_kube(e, POOL_KIND, name))
	}

	#[instrument(skip(self, pool), fields(namespace = %self.namespace, pool = pool.name()))]
	async fn replace_pool_status(&self, pool: &WireguardIPPool) -> K8sResult<WireguardIPPool> {
		let name = pool
			.metadata
			.name
			.as_deref()
			.ok_or(K8sError::MissingName { kind: POOL_KIND })?;

		let body = serde_json::to_vec(pool).map_err(|source| K8sError::Encode {
			kind: POOL_KIND,
			source,
		})?;

		let updated = self
			.pools()
			.replace_status(name, &PostParams::default(), body)
			.await
			.map_err(|e| K8sError::from_kube(e, POOL_KIND, name))?;

		debug!(
			resource_version = updated.metadata.resource_version.as_deref().unwrap_or_default(),
			"replaced pool status"
		);
		Ok(updated)
	}

	#[instrument(skip(self), fields(namespace = %self.namespace))]
	async fn get_peer_request(&self, name: &str) -> K8sResult<WireguardIP> {
		self
			.peers()
			.get(name)
			.await
			.map_err(|e| K8sError::from_kube(e, PEER_KIND, name))
	}

	#[instrument(skip(self, request), fields(namespace = %self.namespace, request = request.name()))]
	async fn create_peer_request(&self, request: &WireguardIP) -> K8sResult<WireguardIP> {
		self
			.peers()
			.create(&PostParams::default(), request)
			.await
			.map_err(|e| K8sError::from_kube(e, PEER_KIND, request.name()))
	}

	#[instrument(skip(self), fields(namespace = %self.namespace))]
	async fn get_secret(&self, name: &str) -> K8sResult<SecretData> {
		let secret = self
			.secrets()
			.get_opt(name)
			.await
			.map_err(|e| K8sError::from_kube(e, SECRET_KIND, name))?
			.ok_or_else(|| K8sError::NotFound {
				kind: SECRET_KIND,
				name: name.to_string(),
			})?;

		Ok(
			secret
				.data
				.unwrap_or_default()
				.into_iter()
				.map(|(k, v)| (k, SecretValue::new(v.0)))
				.collect(),
		)
	}

	#[instrument(skip(self, data), fields(namespace = %self.namespace, keys = data.len()))]
	async fn create_secret(&self, name: &str, data: SecretData) -> K8sResult<()> {
		let secret = Secret {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				namespace: Some(self.namespace.clone()),
				..Default::default()
			},
			type_: Some("Opaque".to_string()),
			data: Some(
				data
					.iter()
					.map(|(k, v)| (k.clone(), ByteString(v.expose().clone())))
					.collect(),
			),
			..Default::default()
		};

		self
			.secrets()
			.create(&PostParams::default(), &secret)
			.await
			.map_err(|e| K8sError::from_kube(e, SECRET_KIND, name))?;

		debug!("created secret");
		Ok(())
	}
}

impl std::fmt::Debug for KubeControlPlane {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KubeControlPlane")
			.field("namespace", &self.namespace)
			.finish()
	}
}
