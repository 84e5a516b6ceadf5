// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Control-plane client for the WireGuard registrar.
//!
//! The registrar keeps two kinds of state in K8s: `WireguardIPPool` records
//! (address space plus a reference to the server key secret) and
//! `WireguardIP` records (one address per peer). [`ControlPlane`] is the seam
//! the rest of the registrar talks through; [`KubeControlPlane`] is the real
//! implementation and [`MockControlPlane`] keeps everything in memory.

pub mod client;
pub mod crd;
pub mod error;
pub mod mock;

pub use client::{ControlPlane, KubeControlPlane, SecretData};
pub use crd::{WireguardIP, WireguardIPPool, WireguardIPPoolSpec, WireguardIPPoolStatus, WireguardIPSpec};
pub use error::{K8sError, K8sResult};
pub use mock::{MockControlPlane, MockOp};
