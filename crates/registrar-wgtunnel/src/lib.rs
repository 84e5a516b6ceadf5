// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard registrar.
//!
//! Binds the host's single WireGuard interface, gives it a server identity
//! persisted in K8s, and admits peers that the cluster has assigned an
//! address to.
//!
//! ```ignore
//! let control_plane = Arc::new(KubeControlPlane::try_default("default").await?);
//! let mut wg = Wireguard::with_host_network(control_plane.clone(), RegistrarConfig::default()).await?;
//!
//! let mut pool = control_plane.get_pool("home").await?;
//! wg.start_server(&mut pool).await?;
//!
//! let request = control_plane.get_peer_request("node-a").await?;
//! let descriptor = wg.register(&request).await?;
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod registrar;
pub mod wireguard;

pub use config::RegistrarConfig;
pub use error::{ConfigError, RegistrarError, Result};
pub use identity::{ensure_identity, IdentityState, SECRET_KEY, SECRET_PREFIX};
pub use registrar::{register_peer, PeerDescriptor, PERSISTENT_KEEPALIVE};
pub use wireguard::Wireguard;
