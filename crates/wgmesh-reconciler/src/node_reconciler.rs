// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use tracing::{debug, info, instrument};
use wgmesh_common::{AnnotationCodec, Peer};
use wgmesh_device::PeerOperation;
use wgmesh_k8s::NodeClient;

use crate::cache::PeerCache;
use crate::device_sync::DeviceSynchronizer;
use crate::error::Result;
use crate::local::LocalNode;

/// What a single invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
	Applied,
	Unchanged,
	Removed,
	NothingToRemove,
	Annotated { changed: bool },
}

/// Per-node reconciliation against the live device.
pub struct NodeReconciler {
	client: Arc<dyn NodeClient>,
	device: DeviceSynchronizer,
	cache: Arc<PeerCache>,
	codec: AnnotationCodec,
	local: LocalNode,
}

impl NodeReconciler {
	pub fn new(
		client: Arc<dyn NodeClient>,
		device: DeviceSynchronizer,
		cache: Arc<PeerCache>,
		codec: AnnotationCodec,
		local: LocalNode,
	) -> Self {
		Self {
			client,
			device,
			cache,
			codec,
			local,
		}
	}

	pub fn cache(&self) -> &Arc<PeerCache> {
		&self.cache
	}

	/// Bring the device in line with the current state of node `name`.
	///
	/// Terminal: the outcome is returned, never retried here. Running it again
	/// with nothing changed is a no-op thanks to the peer cache.
	#[instrument(skip(self), fields(device = %self.device.device_name()))]
	pub async fn reconcile(&self, name: &str) -> Result<ReconcileAction> {
		if self.cache.ensure_hydrated(|| self.hydrate()).await? {
			let peers = self.cache.len().await;
			info!(peers, "peer cache hydrated from device");
		}

		let Some(record) = self.client.get_node(name).await? else {
			return self.remove_node(name).await;
		};

		if self.local.is_local(name) {
			let (_, changed) = self
				.local
				.annotate(&self.codec, self.client.as_ref(), &record)
				.await?;
			return Ok(ReconcileAction::Annotated { changed });
		}

		let peer = self.codec.decode(&record)?;
		peer.validate()?;

		let stale = self
			.cache
			.identity_for_node(name)
			.await
			.filter(|identity| *identity != peer.public_key);
		if stale.is_none() && !self.cache.should_apply(&peer).await {
			debug!(identity = %peer.public_key, "peer already applied");
			return Ok(ReconcileAction::Unchanged);
		}

		self.device
			.apply(PeerOperation::AddOrUpdate(peer.clone()))
			.await?;

		if let Some(stale) = stale {
			self.device.remove(&stale).await?;
			self.cache.record_removed(&stale).await;
			info!(old = %stale, new = %peer.public_key, "retracted rotated peer key");
		}

		info!(peer = %peer, "peer applied");
		self.cache.record_applied(name, peer).await?;
		Ok(ReconcileAction::Applied)
	}

	async fn remove_node(&self, name: &str) -> Result<ReconcileAction> {
		let Some(identity) = self.cache.identity_for_node(name).await else {
			debug!("node gone and never applied");
			return Ok(ReconcileAction::NothingToRemove);
		};

		self.device.remove(&identity).await?;
		self.cache.record_removed(&identity).await;
		info!(identity = %identity, "peer removed");
		Ok(ReconcileAction::Removed)
	}

	/// Seed the cache from the device, trusting only peers the cluster
	/// currently describes. Anything else on the device is retracted.
	async fn hydrate(&self) -> Result<()> {
		let snapshot = self.device.snapshot().await?;
		let nodes = self.client.list_nodes().await?;

		let cluster: Vec<(String, Peer)> = nodes
			.iter()
			.filter(|node| !self.local.is_local(&node.name))
			.filter_map(|node| match self.codec.decode(node) {
				Ok(peer) => Some((node.name.clone(), peer)),
				Err(e) => {
					debug!(node = %node.name, error = %e, "not vouching for node during hydration");
					None
				}
			})
			.collect();

		let untrusted = self.cache.rebuild(snapshot.peers, &cluster).await;
		for identity in untrusted {
			self.device.remove(&identity).await?;
			info!(identity = %identity, "removed peer unknown to the cluster");
		}
		Ok(())
	}
}
