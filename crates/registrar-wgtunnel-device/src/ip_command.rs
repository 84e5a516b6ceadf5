// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use ipnet::IpNet;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, instrument, trace, warn};

use crate::error::LinkError;
use crate::link::{LinkControl, NetworkLink};

/// Link control implemented with the iproute2 `ip` binary.
#[derive(Debug, Clone)]
pub struct IpCommandLinks {
	program: String,
}

impl IpCommandLinks {
	pub fn new() -> Self {
		Self {
			program: "ip".to_string(),
		}
	}

	/// Use a different `ip` binary, e.g. an absolute path.
	pub fn with_program(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
		}
	}
}

impl Default for IpCommandLinks {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Debug, Deserialize)]
struct IpLink {
	ifindex: u32,
	ifname: String,
	#[serde(default)]
	flags: Vec<String>,
}

impl From<IpLink> for NetworkLink {
	fn from(link: IpLink) -> Self {
		let up = link.flags.iter().any(|f| f == "UP");
		NetworkLink {
			index: link.ifindex,
			name: link.ifname,
			up,
		}
	}
}

fn parse_link_json(output: &str) -> Result<Option<NetworkLink>, LinkError> {
	let links: Vec<IpLink> = serde_json::from_str(output)?;
	Ok(links.into_iter().next().map(NetworkLink::from))
}

fn is_missing_device(stderr: &str) -> bool {
	stderr.contains("does not exist") || stderr.contains("Cannot find device")
}

#[async_trait]
impl LinkControl for IpCommandLinks {
	#[instrument(skip(self))]
	async fn add_link(&self, name: &str) -> Result<(), LinkError> {
		self
			.run(&["link", "add", "dev", name, "type", "wireguard"])
			.await?;
		debug!("added wireguard link");
		Ok(())
	}

	#[instrument(skip(self))]
	async fn link_by_name(&self, name: &str) -> Result<Option<NetworkLink>, LinkError> {
		match self.run(&["-j", "link", "show", "dev", name]).await {
			Ok(output) => parse_link_json(&output),
			Err(LinkError::CommandFailed { stderr, .. }) if is_missing_device(&stderr) => Ok(None),
			Err(e) => Err(e),
		}
	}

	#[instrument(skip(self, link, address), fields(link = %link.name, %address))]
	async fn replace_address(&self, link: &NetworkLink, address: IpNet) -> Result<(), LinkError> {
		let address = address.to_string();
		self
			.run(&["address", "replace", &address, "dev", &link.name])
			.await?;
		debug!("replaced link address");
		Ok(())
	}

	#[instrument(skip(self, link), fields(link = %link.name))]
	async fn set_up(&self, link: &NetworkLink) -> Result<(), LinkError> {
		self.run(&["link", "set", "dev", &link.name, "up"]).await?;
		debug!("link set up");
		Ok(())
	}
}

impl IpCommandLinks {
	/// Runs an ip command and returns the stdout on success.
	async fn run(&self, args: &[&str]) -> Result<String, LinkError> {
		let mut cmd = Command::new(&self.program);
		cmd.args(args);

		trace!(cmd = %format!("{} {}", self.program, args.join(" ")), "running ip command");

		let output = cmd.output().await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				warn!("ip not found in PATH");
				LinkError::IpNotInstalled
			} else {
				LinkError::Io(e)
			}
		})?;

		if output.status.success() {
			Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
		} else {
			Err(LinkError::CommandFailed {
				args: args.join(" "),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			})
		}
	}
}
