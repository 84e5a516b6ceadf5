// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use kube::CustomResourceExt;
use registrar_k8s::{ControlPlane, KubeControlPlane, WireguardIP, WireguardIPPool};
use registrar_wgtunnel::{RegistrarConfig, Wireguard};
use tracing::{info, instrument};

#[derive(Debug, Clone, Args)]
pub struct StartArgs {
	/// Name of the WireguardIPPool to serve
	#[arg(long)]
	pub pool: String,
}

#[derive(Debug, Clone, Args)]
pub struct RegisterArgs {
	/// Name of the WireguardIP record holding the peer's address
	#[arg(long)]
	pub name: String,
}

async fn connect(config: &RegistrarConfig) -> anyhow::Result<(Arc<KubeControlPlane>, Wireguard)> {
	let control_plane = Arc::new(
		KubeControlPlane::try_default(config.namespace.clone())
			.await
			.context("failed to build K8s client")?,
	);
	let wg = Wireguard::with_host_network(control_plane.clone(), config.clone())
		.await
		.context("failed to bind wireguard device")?;
	Ok((control_plane, wg))
}

#[instrument(skip(args, config), fields(pool = %args.pool))]
pub async fn handle_start(args: StartArgs, config: RegistrarConfig) -> anyhow::Result<()> {
	let (control_plane, mut wg) = connect(&config).await?;

	let mut pool = control_plane
		.get_pool(&args.pool)
		.await
		.with_context(|| format!("failed to fetch pool {}", args.pool))?;

	wg.start_server(&mut pool)
		.await
		.with_context(|| format!("failed to start server for pool {}", args.pool))?;

	if let Some(public_key) = wg.identity().public_key() {
		info!(%public_key, device = wg.device_name(), "server is up");
		println!("{public_key}");
	}
	Ok(())
}

#[instrument(skip(args, config), fields(name = %args.name))]
pub async fn handle_register(args: RegisterArgs, config: RegistrarConfig) -> anyhow::Result<()> {
	let (control_plane, wg) = connect(&config).await?;

	let request = control_plane
		.get_peer_request(&args.name)
		.await
		.with_context(|| format!("failed to fetch peer request {}", args.name))?;

	let descriptor = wg
		.register(&request)
		.await
		.with_context(|| format!("failed to register peer {}", args.name))?;

	println!("{}", serde_json::to_string_pretty(&descriptor)?);
	Ok(())
}

/// Print the CustomResourceDefinitions the registrar reads and writes.
pub fn handle_crds() -> anyhow::Result<()> {
	let crds = vec![WireguardIPPool::crd(), WireguardIP::crd()];
	println!("{}", serde_json::to_string_pretty(&crds)?);
	Ok(())
}
