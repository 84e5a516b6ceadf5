// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for control-plane operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur while talking to the control plane.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("{kind} not found: {name}")]
	NotFound { kind: &'static str, name: String },

	#[error("{kind} conflict: {name}")]
	Conflict { kind: &'static str, name: String },

	#[error("{kind} has no metadata.name")]
	MissingName { kind: &'static str },

	#[error("failed to encode {kind}: {source}")]
	Encode {
		kind: &'static str,
		#[source]
		source: serde_json::Error,
	},
}

impl K8sError {
	/// Map a kube error for a named object, keeping 404 and 409 distinguishable.
	pub fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
		match err {
			kube::Error::Api(ae) if ae.code == 404 => K8sError::NotFound {
				kind,
				name: name.to_string(),
			},
			kube::Error::Api(ae) if ae.code == 409 => K8sError::Conflict {
				kind,
				name: name.to_string(),
			},
			other => other.into(),
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::NotFound { .. })
	}

	pub fn is_conflict(&self) -> bool {
		matches!(self, K8sError::Conflict { .. })
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}
