// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard registrar binary.

use clap::{Parser, Subcommand};
use registrar_wgtunnel::RegistrarConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{RegisterArgs, StartArgs};

/// wg-registrar - WireGuard server identity and peer registration.
#[derive(Parser, Debug)]
#[command(name = "wg-registrar", about = "WireGuard server identity and peer registration", version)]
struct Args {
	/// Log filter used when RUST_LOG is unset
	#[arg(long, env = "REGISTRAR_LOG", default_value = "info", global = true)]
	log_level: String,

	/// Emit logs as JSON
	#[arg(long, global = true)]
	log_json: bool,

	/// WireGuard interface to create when none exists
	#[arg(long, global = true)]
	interface: Option<String>,

	/// Namespace holding pools, peer requests and key secrets
	#[arg(long, global = true)]
	namespace: Option<String>,

	/// Prefix length of each peer's allowed address
	#[arg(long, global = true)]
	peer_prefix_len: Option<u8>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Install the pool's server identity and bring the interface up
	Start(StartArgs),
	/// Add a peer for a WireguardIP record and print its descriptor as JSON
	Register(RegisterArgs),
	/// Print the custom resource definitions as JSON
	Crds,
}

impl Args {
	fn config(&self) -> anyhow::Result<RegistrarConfig> {
		let mut config = RegistrarConfig::from_env()?;
		if let Some(interface) = &self.interface {
			config = config.with_interface_name(interface.clone())?;
		}
		if let Some(namespace) = &self.namespace {
			config = config.with_namespace(namespace.clone());
		}
		if let Some(prefix_len) = self.peer_prefix_len {
			config = config.with_peer_prefix_len(prefix_len)?;
		}
		Ok(config)
	}
}

fn init_tracing(level: &str, json: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
	let registry = tracing_subscriber::registry().with(filter);
	if json {
		registry
			.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init();
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	init_tracing(&args.log_level, args.log_json);

	let config = args.config()?;
	tracing::debug!(?config, "loaded configuration");

	match args.command {
		Command::Start(start) => commands::handle_start(start, config).await,
		Command::Register(register) => commands::handle_register(register, config).await,
		Command::Crds => commands::handle_crds(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_definition_is_valid() {
		Args::command().debug_assert();
	}

	#[test]
	fn parses_register_with_overrides() {
		let args = Args::try_parse_from([
			"wg-registrar",
			"register",
			"--name",
			"node-a",
			"--interface",
			"wg9",
			"--peer-prefix-len",
			"32",
		])
		.unwrap();
		assert_eq!(args.interface.as_deref(), Some("wg9"));
		assert_eq!(args.peer_prefix_len, Some(32));
		match args.command {
			Command::Register(register) => assert_eq!(register.name, "node-a"),
			other => panic!("expected register, got {other:?}"),
		}
	}

	#[test]
	fn start_requires_pool() {
		assert!(Args::try_parse_from(["wg-registrar", "start"]).is_err());
	}
}
