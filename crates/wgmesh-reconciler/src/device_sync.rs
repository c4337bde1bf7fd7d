// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use tracing::{debug, instrument};
use wgmesh_device::{DeviceControl, DeviceSnapshot, DeviceUpdate, PeerOperation};

use crate::error::Result;

/// Single-shot peer operations against one named device.
///
/// Failures are returned as [`crate::ReconcileError::DeviceCallFailed`] and
/// never retried here; the control loop's next cycle is the retry.
#[derive(Clone)]
pub struct DeviceSynchronizer {
	device: Arc<dyn DeviceControl>,
	name: String,
}

impl DeviceSynchronizer {
	pub fn new(device: Arc<dyn DeviceControl>, name: impl Into<String>) -> Self {
		Self {
			device,
			name: name.into(),
		}
	}

	pub fn device_name(&self) -> &str {
		&self.name
	}

	#[instrument(skip_all, fields(device = %self.name, identity = %operation.identity()))]
	pub async fn apply(&self, operation: PeerOperation) -> Result<()> {
		if let PeerOperation::AddOrUpdate(peer) = &operation {
			peer.validate()?;
		}
		self.device
			.configure_device(&self.name, DeviceUpdate::peer(operation))
			.await?;
		debug!("device accepted peer operation");
		Ok(())
	}

	pub async fn remove(&self, identity: &str) -> Result<()> {
		self.apply(PeerOperation::Remove {
			identity: identity.to_string(),
		})
		.await
	}

	#[instrument(skip_all, fields(device = %self.name))]
	pub async fn snapshot(&self) -> Result<DeviceSnapshot> {
		Ok(self.device.list_device(&self.name).await?)
	}
}

impl std::fmt::Debug for DeviceSynchronizer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeviceSynchronizer")
			.field("name", &self.name)
			.finish()
	}
}
