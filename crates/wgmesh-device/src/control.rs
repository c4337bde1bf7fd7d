// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use wgmesh_common::Peer;

use crate::error::DeviceError;

/// Live state of a tunnel device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
	pub public_key: Option<String>,
	pub listen_port: u16,
	pub peers: Vec<Peer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOperation {
	/// Create the peer or replace its allowed IPs and endpoint.
	AddOrUpdate(Peer),
	Remove { identity: String },
}

impl PeerOperation {
	pub fn identity(&self) -> &str {
		match self {
			PeerOperation::AddOrUpdate(peer) => &peer.public_key,
			PeerOperation::Remove { identity } => identity,
		}
	}
}

/// One configuration call. Fields left unset are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceUpdate {
	pub listen_port: Option<u16>,
	pub peers: Vec<PeerOperation>,
}

impl DeviceUpdate {
	pub fn peer(operation: PeerOperation) -> Self {
		Self {
			listen_port: None,
			peers: vec![operation],
		}
	}

	pub fn is_empty(&self) -> bool {
		self.listen_port.is_none() && self.peers.is_empty()
	}
}

/// Narrow control surface over a tunnel device that already exists.
///
/// Calls are single-shot. Implementations do not retry.
#[async_trait]
pub trait DeviceControl: Send + Sync {
	async fn list_device(&self, name: &str) -> Result<DeviceSnapshot, DeviceError>;

	async fn configure_device(&self, name: &str, update: DeviceUpdate) -> Result<(), DeviceError>;
}
