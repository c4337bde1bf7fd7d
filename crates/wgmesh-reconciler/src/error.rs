// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};
use wgmesh_common::{CodecError, PeerError};
use wgmesh_device::DeviceError;
use wgmesh_k8s::K8sError;

#[derive(Debug, Error)]
pub enum ReconcileError {
	#[error(transparent)]
	Codec(#[from] CodecError),

	#[error("invalid peer: {0}")]
	InvalidPeer(#[from] PeerError),

	#[error("device call failed: {0}")]
	DeviceCallFailed(#[from] DeviceError),

	#[error("cluster API error: {0}")]
	Cluster(#[from] K8sError),

	#[error("failed to persist {path}: {source}")]
	PersistenceFailed {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("local node {0} is not registered with the cluster")]
	LocalNodeMissing(String),

	#[error("cannot derive an overlay address from underlay {underlay:?} in {cidr}")]
	UnsupportedUnderlay { underlay: String, cidr: String },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
	pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		ReconcileError::PersistenceFailed {
			path: path.into(),
			source,
		}
	}

	/// Not-ready nodes are expected during rollout and retried next cycle.
	pub fn is_missing_metadata(&self) -> bool {
		matches!(self, ReconcileError::Codec(e) if e.is_missing_metadata())
	}

	/// Whether re-running the same invocation later can succeed without the
	/// node object changing first.
	pub fn is_retryable(&self) -> bool {
		!matches!(
			self,
			ReconcileError::Codec(_)
				| ReconcileError::InvalidPeer(_)
				| ReconcileError::UnsupportedUnderlay { .. }
		)
	}

	/// Emit one log line at the level the failure class calls for.
	pub fn report(&self, node: &str) {
		match self {
			ReconcileError::Codec(e) if e.is_missing_metadata() => {
				info!(node, error = %e, "node not ready for the mesh yet")
			}
			ReconcileError::Codec(e) => warn!(node, error = %e, "skipping node with malformed metadata"),
			ReconcileError::InvalidPeer(e) => warn!(node, error = %e, "skipping invalid peer"),
			ReconcileError::DeviceCallFailed(e) => error!(node, error = %e, "device call failed"),
			ReconcileError::PersistenceFailed { path, source } => {
				error!(node, path = %path.display(), error = %source, "failed to persist configuration")
			}
			other => error!(node, error = %other, "reconcile failed"),
		}
	}
}
