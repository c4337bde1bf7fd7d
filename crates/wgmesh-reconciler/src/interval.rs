// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fixed-period poll-and-converge of the wg-quick file.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use wgmesh_common::{AnnotationCodec, HostInterface, Peer, WireguardTextConfig};
use wgmesh_k8s::NodeClient;

use crate::cache::{PeerCache, PeerDiff};
use crate::error::{ReconcileError, Result};
use crate::file_sync::{ConvergeOutcome, FileSynchronizer};
use crate::local::LocalNode;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
	pub peers: usize,
	pub diff: PeerDiff,
	pub converge: ConvergeOutcome,
}

pub struct IntervalSyncer {
	client: Arc<dyn NodeClient>,
	files: FileSynchronizer,
	cache: Arc<PeerCache>,
	codec: AnnotationCodec,
	local: LocalNode,
	period: Duration,
}

impl IntervalSyncer {
	pub fn new(
		client: Arc<dyn NodeClient>,
		files: FileSynchronizer,
		cache: Arc<PeerCache>,
		codec: AnnotationCodec,
		local: LocalNode,
		period: Duration,
	) -> Self {
		Self {
			client,
			files,
			cache,
			codec,
			local,
			period,
		}
	}

	/// Tick until cancelled. Failures are logged and end only the tick they
	/// happened in; the next one starts after a full period.
	pub async fn run(&self, cancel: CancellationToken) {
		info!(
			period_secs = self.period.as_secs(),
			path = %self.files.config_path().display(),
			"interval sync started"
		);

		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				result = self.run_once() => {
					if let Err(e) = result {
						e.report(&self.local.name);
					}
				}
			}

			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				_ = tokio::time::sleep(self.period) => {}
			}
		}

		info!("interval sync stopped");
	}

	/// One tick: host interface, then peers, then the file.
	#[instrument(skip(self), fields(node = %self.local.name))]
	pub async fn run_once(&self) -> Result<TickReport> {
		let host = self.sync_host().await?;
		let peers = self.sync_peers().await?;
		self.sync_config(host, peers).await
	}

	async fn sync_host(&self) -> Result<HostInterface> {
		let record = self
			.client
			.get_node(&self.local.name)
			.await?
			.ok_or_else(|| ReconcileError::LocalNodeMissing(self.local.name.clone()))?;
		let (address, _) = self
			.local
			.annotate(&self.codec, self.client.as_ref(), &record)
			.await?;
		Ok(self.local.host_interface(address))
	}

	/// Every other node that decodes to a valid peer, ordered by node name.
	async fn sync_peers(&self) -> Result<Vec<(String, Peer)>> {
		let mut nodes = self.client.list_nodes().await?;
		nodes.sort_by(|a, b| a.name.cmp(&b.name));

		let mut entries = Vec::with_capacity(nodes.len());
		for node in nodes.iter().filter(|n| !self.local.is_local(&n.name)) {
			let decoded = self
				.codec
				.decode(node)
				.map_err(ReconcileError::from)
				.and_then(|peer| {
					peer.validate()?;
					Ok(peer)
				});
			match decoded {
				Ok(peer) => entries.push((node.name.clone(), peer)),
				Err(e) => e.report(&node.name),
			}
		}

		let hydrated = self
			.cache
			.ensure_hydrated(|| async {
				let on_file = self.files.read().await?;
				let untrusted = self.cache.rebuild(on_file.peers, &entries).await;
				if !untrusted.is_empty() {
					debug!(count = untrusted.len(), "config file holds peers unknown to the cluster");
				}
				Ok::<_, ReconcileError>(())
			})
			.await?;
		if hydrated {
			let peers = self.cache.len().await;
			debug!(peers, "peer cache hydrated from config file");
		}

		Ok(entries)
	}

	async fn sync_config(&self, host: HostInterface, entries: Vec<(String, Peer)>) -> Result<TickReport> {
		let peers: Vec<Peer> = entries.iter().map(|(_, peer)| peer.clone()).collect();
		let diff = self.cache.diff(&peers).await;
		if !diff.is_empty() {
			info!(
				added = diff.added.len(),
				changed = diff.changed.len(),
				removed = diff.removed.len(),
				"peer set changed"
			);
		}

		let desired = WireguardTextConfig::new(host, peers);
		let converge = self.files.converge(&desired).await?;
		self.cache.replace(&entries).await;

		Ok(TickReport {
			peers: desired.peers.len(),
			diff,
			converge,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;
	use wgmesh_common::{ClusterNodeRecord, NodeAddress, WgKeyPair, WgPrivateKey, INTERNAL_IP};
	use wgmesh_k8s::MockNodeClient;

	fn syncer(client: Arc<MockNodeClient>, dir: &TempDir) -> IntervalSyncer {
		IntervalSyncer::new(
			client,
			FileSynchronizer::new(dir.path().join("wg0.conf"), dir.path().join("update")),
			Arc::new(PeerCache::new()),
			AnnotationCodec::default(),
			LocalNode::new(
				"node-a",
				WgKeyPair::from_private_key(WgPrivateKey::from_bytes([1u8; 32])),
				"100.64.0.0/16",
				51820,
			),
			Duration::from_secs(5),
		)
	}

	fn assert_send<T: Send>(_: &T) {}

	#[test]
	fn tick_future_can_be_spawned() {
		let dir = TempDir::new().unwrap();
		let syncer = syncer(Arc::new(MockNodeClient::new()), &dir);
		assert_send(&syncer.run_once());
		assert_send(&syncer.run(CancellationToken::new()));
	}

	#[tokio::test]
	async fn missing_local_node_aborts_tick() {
		let dir = TempDir::new().unwrap();
		let client = Arc::new(MockNodeClient::new());
		let err = syncer(client.clone(), &dir).run_once().await.unwrap_err();

		assert!(matches!(err, ReconcileError::LocalNodeMissing(ref n) if n == "node-a"));
		assert_eq!(client.list_calls(), 0);
		assert!(!dir.path().join("wg0.conf").exists());
	}

	#[tokio::test]
	async fn lone_node_writes_interface_only() {
		let dir = TempDir::new().unwrap();
		let mut node = ClusterNodeRecord::new("node-a");
		node.addresses
			.push(NodeAddress::new("10.0.5.9", INTERNAL_IP));
		let client = Arc::new(MockNodeClient::with_nodes([node]));

		let report = syncer(client, &dir).run_once().await.unwrap();
		assert_eq!(report.peers, 0);
		assert!(report.converge.rewritten);

		let text = std::fs::read_to_string(dir.path().join("wg0.conf")).unwrap();
		assert!(text.contains("Address = 100.64.5.9"));
		assert!(!text.contains("[Peer]"));
	}

	#[tokio::test(start_paused = true)]
	async fn run_keeps_ticking_after_failures() {
		let dir = TempDir::new().unwrap();
		let client = Arc::new(MockNodeClient::new());
		client.set_failing(true);
		let syncer = Arc::new(syncer(client.clone(), &dir));
		let cancel = CancellationToken::new();

		let task = tokio::spawn({
			let syncer = Arc::clone(&syncer);
			let cancel = cancel.clone();
			async move { syncer.run(cancel).await }
		});

		tokio::time::sleep(Duration::from_secs(11)).await;
		cancel.cancel();
		task.await.unwrap();

		assert_eq!(client.get_calls(), 3);
	}
}
