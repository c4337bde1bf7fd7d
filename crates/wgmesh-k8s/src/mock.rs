// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory [`NodeClient`] for tests.

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use wgmesh_common::ClusterNodeRecord;

use crate::client::{NodeClient, NodeEvent};
use crate::error::K8sError;

/// Holds nodes in a map and emits a watch event for every mutation made
/// through [`MockNodeClient::upsert_node`] and [`MockNodeClient::remove_node`].
pub struct MockNodeClient {
	nodes: Mutex<BTreeMap<String, ClusterNodeRecord>>,
	events: UnboundedSender<Result<NodeEvent, K8sError>>,
	receiver: Mutex<Option<UnboundedReceiver<Result<NodeEvent, K8sError>>>>,
	fail_requests: AtomicBool,
	list_calls: AtomicUsize,
	get_calls: AtomicUsize,
	patch_calls: AtomicUsize,
}

impl Default for MockNodeClient {
	fn default() -> Self {
		Self::new()
	}
}

impl MockNodeClient {
	pub fn new() -> Self {
		let (events, receiver) = unbounded();
		Self {
			nodes: Mutex::new(BTreeMap::new()),
			events,
			receiver: Mutex::new(Some(receiver)),
			fail_requests: AtomicBool::new(false),
			list_calls: AtomicUsize::new(0),
			get_calls: AtomicUsize::new(0),
			patch_calls: AtomicUsize::new(0),
		}
	}

	pub fn with_nodes(nodes: impl IntoIterator<Item = ClusterNodeRecord>) -> Self {
		let client = Self::new();
		{
			let mut map = client.nodes.lock().unwrap();
			for node in nodes {
				map.insert(node.name.clone(), node);
			}
		}
		client
	}

	pub fn upsert_node(&self, node: ClusterNodeRecord) {
		self.nodes
			.lock()
			.unwrap()
			.insert(node.name.clone(), node.clone());
		let _ = self.events.unbounded_send(Ok(NodeEvent::Applied(node)));
	}

	pub fn remove_node(&self, name: &str) {
		let removed = self.nodes.lock().unwrap().remove(name);
		if let Some(node) = removed {
			let _ = self.events.unbounded_send(Ok(NodeEvent::Deleted(node)));
		}
	}

	/// Push an arbitrary event onto the watch stream.
	pub fn emit(&self, event: Result<NodeEvent, K8sError>) {
		let _ = self.events.unbounded_send(event);
	}

	/// Close the watch stream.
	pub fn close_watch(&self) {
		self.events.close_channel();
	}

	pub fn node(&self, name: &str) -> Option<ClusterNodeRecord> {
		self.nodes.lock().unwrap().get(name).cloned()
	}

	/// Make every unary request fail with an API error until reset.
	pub fn set_failing(&self, failing: bool) {
		self.fail_requests.store(failing, Ordering::SeqCst);
	}

	pub fn list_calls(&self) -> usize {
		self.list_calls.load(Ordering::SeqCst)
	}

	pub fn get_calls(&self) -> usize {
		self.get_calls.load(Ordering::SeqCst)
	}

	pub fn patch_calls(&self) -> usize {
		self.patch_calls.load(Ordering::SeqCst)
	}

	fn check_failing(&self) -> Result<(), K8sError> {
		if self.fail_requests.load(Ordering::SeqCst) {
			return Err(K8sError::ApiError {
				message: "injected failure".to_string(),
			});
		}
		Ok(())
	}
}

#[async_trait]
impl NodeClient for MockNodeClient {
	async fn list_nodes(&self) -> Result<Vec<ClusterNodeRecord>, K8sError> {
		self.list_calls.fetch_add(1, Ordering::SeqCst);
		self.check_failing()?;
		Ok(self.nodes.lock().unwrap().values().cloned().collect())
	}

	async fn get_node(&self, name: &str) -> Result<Option<ClusterNodeRecord>, K8sError> {
		self.get_calls.fetch_add(1, Ordering::SeqCst);
		self.check_failing()?;
		Ok(self.nodes.lock().unwrap().get(name).cloned())
	}

	async fn patch_node_annotations(
		&self,
		name: &str,
		annotations: &BTreeMap<String, String>,
	) -> Result<(), K8sError> {
		self.patch_calls.fetch_add(1, Ordering::SeqCst);
		self.check_failing()?;
		let mut nodes = self.nodes.lock().unwrap();
		let node = nodes.get_mut(name).ok_or_else(|| K8sError::NodeNotFound {
			name: name.to_string(),
		})?;
		node.annotations
			.extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
		Ok(())
	}

	fn watch_nodes(&self) -> BoxStream<'static, Result<NodeEvent, K8sError>> {
		match self.receiver.lock().unwrap().take() {
			Some(receiver) => receiver.boxed(),
			None => stream::empty().boxed(),
		}
	}
}
