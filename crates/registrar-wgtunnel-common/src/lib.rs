// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard key types used by the registrar.

pub mod keys;

pub use keys::{KeyError, WgKeyPair, WgPrivateKey, WgPublicKey, WG_KEY_LEN};
