// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tracing::{info, instrument, warn};

use crate::error::{DeviceError, LinkError};
use crate::link::{LinkControl, NetworkLink};
use crate::tunnel::{TunnelControl, TunnelDevice};

/// Bind to the host's single WireGuard device, creating it as `name` if none
/// exists.
///
/// More than one device is a configuration error: nothing is created or
/// modified in that case.
#[instrument(skip(tunnel, links))]
pub async fn discover_or_create(
	tunnel: &dyn TunnelControl,
	links: &dyn LinkControl,
	name: &str,
) -> Result<(TunnelDevice, NetworkLink), DeviceError> {
	let mut devices = tunnel.devices().await?;

	if devices.len() > 1 {
		return Err(DeviceError::Ambiguous {
			names: devices.into_iter().map(|d| d.name).collect(),
		});
	}

	let device = match devices.pop() {
		Some(device) => {
			if device.name != name {
				warn!(found = %device.name, "binding to existing wireguard device with a different name");
			}
			info!(device = %device.name, "found existing wireguard device");
			device
		}
		None => {
			info!("creating a wireguard interface");
			links.add_link(name).await?;
			tunnel.device(name).await?
		}
	};

	let link = links
		.link_by_name(&device.name)
		.await?
		.ok_or_else(|| LinkError::NotFound(device.name.clone()))?;

	Ok((device, link))
}
