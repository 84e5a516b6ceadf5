// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use registrar_common_secret::SecretString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

pub const WG_KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum KeyError {
	#[error("invalid base64: {0}")]
	InvalidBase64(#[from] base64::DecodeError),

	#[error("invalid key length: expected {WG_KEY_LEN} bytes, got {0}")]
	InvalidLength(usize),

	#[error("key is all zeros")]
	Zero,
}

fn decode_key(encoded: &str) -> Result<Zeroizing<[u8; WG_KEY_LEN]>, KeyError> {
	let decoded = Zeroizing::new(STANDARD.decode(encoded.trim())?);
	if decoded.len() != WG_KEY_LEN {
		return Err(KeyError::InvalidLength(decoded.len()));
	}
	let mut bytes = Zeroizing::new([0u8; WG_KEY_LEN]);
	bytes.copy_from_slice(&decoded);
	Ok(bytes)
}

/// Curve25519 private key, clamped the way `wg genkey` clamps it.
#[derive(Clone)]
pub struct WgPrivateKey(StaticSecret);

impl WgPrivateKey {
	pub fn generate() -> Self {
		let mut bytes = Zeroizing::new([0u8; WG_KEY_LEN]);
		OsRng.fill_bytes(&mut bytes[..]);
		bytes[0] &= 248;
		bytes[31] &= 127;
		bytes[31] |= 64;
		Self(StaticSecret::from(*bytes))
	}

	pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
		let bytes = decode_key(encoded)?;
		Ok(Self(StaticSecret::from(*bytes)))
	}

	pub fn to_base64(&self) -> SecretString {
		SecretString::new(STANDARD.encode(self.0.as_bytes()))
	}

	pub fn as_bytes(&self) -> &[u8; WG_KEY_LEN] {
		self.0.as_bytes()
	}

	pub fn public_key(&self) -> WgPublicKey {
		WgPublicKey(PublicKey::from(&self.0).to_bytes())
	}

	/// The all-zero key the kernel reports for a device without an identity.
	pub fn is_zero(&self) -> bool {
		self.0.as_bytes().iter().all(|b| *b == 0)
	}
}

impl PartialEq for WgPrivateKey {
	fn eq(&self, other: &Self) -> bool {
		self.0.as_bytes() == other.0.as_bytes()
	}
}

impl Eq for WgPrivateKey {}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("WgPrivateKey")
			.field(&registrar_common_secret::REDACTED)
			.finish()
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WgPublicKey([u8; WG_KEY_LEN]);

impl WgPublicKey {
	pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
		let bytes = decode_key(encoded)?;
		Ok(Self(*bytes))
	}

	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.0)
	}

	pub fn as_bytes(&self) -> &[u8; WG_KEY_LEN] {
		&self.0
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WgPublicKey({})", self.to_base64())
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		Self::from_base64(&encoded).map_err(serde::de::Error::custom)
	}
}

#[derive(Clone, Debug)]
pub struct WgKeyPair {
	private: WgPrivateKey,
	public: WgPublicKey,
}

impl WgKeyPair {
	pub fn generate() -> Self {
		let private = WgPrivateKey::generate();
		let public = private.public_key();
		Self { private, public }
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn generated_key_is_clamped() {
		let key = WgPrivateKey::generate();
		let bytes = key.as_bytes();
		assert_eq!(bytes[0] & 7, 0);
		assert_eq!(bytes[31] & 128, 0);
		assert_eq!(bytes[31] & 64, 64);
		assert!(!key.is_zero());
	}

	#[test]
	fn zero_key_is_sentinel() {
		let key = WgPrivateKey::from_base64("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").unwrap();
		assert!(key.is_zero());
	}

	#[test]
	fn private_key_base64_roundtrip() {
		let key = WgPrivateKey::generate();
		let encoded = key.to_base64();
		let parsed = WgPrivateKey::from_base64(encoded.expose()).unwrap();
		assert_eq!(key, parsed);
		assert_eq!(key.public_key(), parsed.public_key());
	}

	#[test]
	fn parse_tolerates_trailing_newline() {
		let key = WgPrivateKey::generate();
		let encoded = format!("{}\n", key.to_base64().expose());
		assert_eq!(WgPrivateKey::from_base64(&encoded).unwrap(), key);
	}

	#[test]
	fn rejects_wrong_length() {
		let err = WgPublicKey::from_base64(&STANDARD.encode([1u8; 16])).unwrap_err();
		assert!(matches!(err, KeyError::InvalidLength(16)));
	}

	#[test]
	fn rejects_invalid_base64() {
		let err = WgPrivateKey::from_base64("not base64!!").unwrap_err();
		assert!(matches!(err, KeyError::InvalidBase64(_)));
	}

	#[test]
	fn debug_does_not_leak_private_key() {
		let key = WgPrivateKey::generate();
		let debug = format!("{:?}", key);
		assert!(!debug.contains(key.to_base64().expose().as_str()));
	}

	#[test]
	fn public_key_serializes_as_base64() {
		let pair = WgKeyPair::generate();
		let json = serde_json::to_string(pair.public_key()).unwrap();
		assert_eq!(json, format!("\"{}\"", pair.public_key().to_base64()));
		let back: WgPublicKey = serde_json::from_str(&json).unwrap();
		assert_eq!(&back, pair.public_key());
	}

	#[test]
	fn keypair_public_matches_private() {
		let pair = WgKeyPair::generate();
		assert_eq!(pair.private_key().public_key(), *pair.public_key());
	}

	proptest! {
		#[test]
		fn any_32_bytes_parse_back(bytes in proptest::array::uniform32(any::<u8>())) {
			let encoded = STANDARD.encode(bytes);
			let key = WgPrivateKey::from_base64(&encoded).unwrap();
			prop_assert_eq!(key.as_bytes(), &bytes);
			prop_assert_eq!(key.is_zero(), bytes.iter().all(|b| *b == 0));
		}
	}
}
