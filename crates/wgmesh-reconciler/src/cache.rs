// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! What has already been pushed to the device (or the file).
//!
//! Entries are only recorded after the downstream write succeeded, so a
//! cache hit means "nothing to do". The node-name index lets the removal
//! path find the identity of a node whose object is already gone.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use wgmesh_common::{Peer, PeerError};

#[derive(Debug, Default)]
struct CacheState {
	peers: HashMap<String, Peer>,
	nodes: HashMap<String, String>,
}

impl CacheState {
	fn forget_identity(&mut self, identity: &str) -> Option<Peer> {
		self.nodes.retain(|_, id| id != identity);
		self.peers.remove(identity)
	}
}

/// Identities that differ between the cache and a desired peer set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDiff {
	pub added: Vec<String>,
	pub changed: Vec<String>,
	pub removed: Vec<String>,
}

impl PeerDiff {
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
	}
}

#[derive(Debug, Default)]
pub struct PeerCache {
	state: RwLock<CacheState>,
	hydrated: Mutex<bool>,
}

impl PeerCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// False when the cache already holds an identical mapping, or when the
	/// peer is invalid and must never be applied.
	pub async fn should_apply(&self, peer: &Peer) -> bool {
		if !peer.is_valid() {
			return false;
		}
		let state = self.state.read().await;
		state.peers.get(&peer.public_key) != Some(peer)
	}

	/// Record a peer the device confirmed for `node`.
	///
	/// Returns the identity `node` previously mapped to when it has changed
	/// (key rotation). That stale entry stays cached until the caller has
	/// retracted it and calls [`PeerCache::record_removed`].
	pub async fn record_applied(&self, node: &str, peer: Peer) -> Result<Option<String>, PeerError> {
		peer.validate()?;
		let mut state = self.state.write().await;
		let previous = state
			.nodes
			.insert(node.to_string(), peer.public_key.clone())
			.filter(|old| *old != peer.public_key);
		state.peers.insert(peer.public_key.clone(), peer);
		Ok(previous)
	}

	pub async fn record_removed(&self, identity: &str) -> Option<Peer> {
		self.state.write().await.forget_identity(identity)
	}

	pub async fn identity_for_node(&self, node: &str) -> Option<String> {
		self.state.read().await.nodes.get(node).cloned()
	}

	pub async fn len(&self) -> usize {
		self.state.read().await.peers.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}

	/// Discard everything and repopulate from what is actually applied
	/// (`source`), keeping only identities the cluster currently vouches for.
	///
	/// Returns the identities in `source` the cluster does not know about.
	/// They are left out of the cache so the caller can retract them.
	pub async fn rebuild(&self, source: Vec<Peer>, cluster: &[(String, Peer)]) -> Vec<String> {
		let vouched: HashMap<&str, &str> = cluster
			.iter()
			.filter(|(_, peer)| peer.is_valid())
			.map(|(node, peer)| (peer.public_key.as_str(), node.as_str()))
			.collect();

		let mut state = CacheState::default();
		let mut untrusted = Vec::new();
		for peer in source {
			match vouched.get(peer.public_key.as_str()) {
				Some(node) if peer.is_valid() => {
					state.nodes.insert(node.to_string(), peer.public_key.clone());
					state.peers.insert(peer.public_key.clone(), peer);
				}
				Some(_) => {
					debug!(identity = %peer.public_key, "applied peer is incomplete, not caching");
				}
				None => untrusted.push(peer.public_key),
			}
		}

		debug!(
			cached = state.peers.len(),
			untrusted = untrusted.len(),
			"peer cache rebuilt"
		);
		*self.state.write().await = state;
		untrusted
	}

	/// Replace the cache wholesale with `entries`, skipping invalid peers.
	pub async fn replace(&self, entries: &[(String, Peer)]) {
		let mut state = CacheState::default();
		for (node, peer) in entries.iter().filter(|(_, p)| p.is_valid()) {
			state.nodes.insert(node.clone(), peer.public_key.clone());
			state.peers.insert(peer.public_key.clone(), peer.clone());
		}
		*self.state.write().await = state;
	}

	pub async fn diff(&self, desired: &[Peer]) -> PeerDiff {
		let state = self.state.read().await;
		let mut diff = PeerDiff::default();
		let mut wanted = BTreeSet::new();

		for peer in desired {
			wanted.insert(peer.public_key.as_str());
			match state.peers.get(&peer.public_key) {
				None => diff.added.push(peer.public_key.clone()),
				Some(cached) if cached != peer => diff.changed.push(peer.public_key.clone()),
				Some(_) => {}
			}
		}

		diff.removed = state
			.peers
			.keys()
			.filter(|id| !wanted.contains(id.as_str()))
			.cloned()
			.collect();
		diff.removed.sort();
		diff
	}

	pub async fn is_hydrated(&self) -> bool {
		*self.hydrated.lock().await
	}

	/// Run `hydrate` unless a previous call already succeeded.
	///
	/// Concurrent callers queue on the hydration lock, so `hydrate` never
	/// runs twice at once. A failure leaves the cache un-hydrated and the
	/// next caller tries again. Returns whether this call did the work.
	pub async fn ensure_hydrated<F, Fut, E>(&self, hydrate: F) -> Result<bool, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<(), E>>,
	{
		let mut hydrated = self.hydrated.lock().await;
		if *hydrated {
			return Ok(false);
		}
		hydrate().await?;
		*hydrated = true;
		Ok(true)
	}
}
