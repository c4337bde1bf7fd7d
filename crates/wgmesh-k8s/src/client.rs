// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use wgmesh_common::ClusterNodeRecord;

use crate::error::K8sError;

/// A change to cluster membership as seen by the watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
	/// A node was created or updated, or replayed by a relist.
	Applied(ClusterNodeRecord),
	/// A node was deleted. The record is its last known state.
	Deleted(ClusterNodeRecord),
	/// A relist finished; every current node has been replayed as `Applied`.
	Resynced,
}

impl NodeEvent {
	pub fn node_name(&self) -> Option<&str> {
		match self {
			NodeEvent::Applied(node) | NodeEvent::Deleted(node) => Some(node.name.as_str()),
			NodeEvent::Resynced => None,
		}
	}
}

/// Cluster node operations the mesh needs.
///
/// Only the local node is ever written, and only its annotations.
#[async_trait]
pub trait NodeClient: Send + Sync {
	async fn list_nodes(&self) -> Result<Vec<ClusterNodeRecord>, K8sError>;

	/// Fetch a node by name. A node that does not exist is `Ok(None)`.
	async fn get_node(&self, name: &str) -> Result<Option<ClusterNodeRecord>, K8sError>;

	/// Merge `annotations` into the node's existing annotations.
	async fn patch_node_annotations(
		&self,
		name: &str,
		annotations: &BTreeMap<String, String>,
	) -> Result<(), K8sError>;

	/// Stream of node changes. Transient watch failures are retried inside
	/// the stream; errors that surface are informational.
	fn watch_nodes(&self) -> BoxStream<'static, Result<NodeEvent, K8sError>>;
}
