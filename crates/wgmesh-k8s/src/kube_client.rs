// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, StreamExt};
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};
use wgmesh_common::{ClusterNodeRecord, NodeAddress};

use crate::client::{NodeClient, NodeEvent};
use crate::error::K8sError;

/// Production node client backed by the kube crate.
///
/// Every unary request is bounded by `request_timeout`. The watch stream is
/// long-lived and is not.
pub struct KubeNodeClient {
	client: Client,
	request_timeout: Duration,
}

impl KubeNodeClient {
	/// Create a client that auto-discovers cluster configuration.
	///
	/// This will attempt to load config from:
	/// 1. In-cluster service account (when running in K8s)
	/// 2. KUBECONFIG environment variable
	/// 3. ~/.kube/config
	pub async fn new(request_timeout: Duration) -> Result<Self, K8sError> {
		let client = Client::try_default()
			.await
			.map_err(|e| K8sError::Config {
				message: e.to_string(),
			})?;
		debug!("K8s client initialized");
		Ok(Self::from_client(client, request_timeout))
	}

	pub fn from_client(client: Client, request_timeout: Duration) -> Self {
		Self {
			client,
			request_timeout,
		}
	}

	fn nodes(&self) -> Api<Node> {
		Api::all(self.client.clone())
	}
}

#[async_trait]
impl NodeClient for KubeNodeClient {
	#[instrument(skip(self))]
	async fn list_nodes(&self) -> Result<Vec<ClusterNodeRecord>, K8sError> {
		let list = timeout(self.request_timeout, self.nodes().list(&ListParams::default())).await??;
		Ok(list.items.into_iter().map(node_record).collect())
	}

	#[instrument(skip(self))]
	async fn get_node(&self, name: &str) -> Result<Option<ClusterNodeRecord>, K8sError> {
		let node = timeout(self.request_timeout, self.nodes().get_opt(name)).await??;
		Ok(node.map(node_record))
	}

	#[instrument(skip(self, annotations))]
	async fn patch_node_annotations(
		&self,
		name: &str,
		annotations: &BTreeMap<String, String>,
	) -> Result<(), K8sError> {
		let patch = json!({ "metadata": { "annotations": annotations } });
		let nodes = self.nodes();
		let result = timeout(
			self.request_timeout,
			nodes.patch(name, &PatchParams::default(), &Patch::Merge(&patch)),
		)
		.await?;

		match result {
			Ok(_) => Ok(()),
			Err(kube::Error::Api(err)) if err.code == 404 => {
				Err(K8sError::NodeNotFound { name: name.into() })
			}
			Err(e) => Err(e.into()),
		}
	}

	fn watch_nodes(&self) -> BoxStream<'static, Result<NodeEvent, K8sError>> {
		watcher::watcher(self.nodes(), watcher::Config::default())
			.default_backoff()
			.filter_map(|event| {
				future::ready(match event {
					Ok(Event::Apply(node)) | Ok(Event::InitApply(node)) => {
						Some(Ok(NodeEvent::Applied(node_record(node))))
					}
					Ok(Event::Delete(node)) => Some(Ok(NodeEvent::Deleted(node_record(node)))),
					Ok(Event::InitDone) => Some(Ok(NodeEvent::Resynced)),
					Ok(Event::Init) => None,
					Err(e) => Some(Err(K8sError::Watch {
						message: e.to_string(),
					})),
				})
			})
			.boxed()
	}
}

/// Project a Node object onto the fields the mesh reads. `spec.podCIDRs`
/// wins over the legacy single `spec.podCIDR`.
pub fn node_record(node: Node) -> ClusterNodeRecord {
	let name = node.metadata.name.unwrap_or_default();
	let annotations = node.metadata.annotations.unwrap_or_default();

	let addresses = node
		.status
		.and_then(|s| s.addresses)
		.unwrap_or_default()
		.into_iter()
		.map(|a| NodeAddress::new(a.address, a.type_))
		.collect();

	let pod_cidrs = node
		.spec
		.map(|spec| match spec.pod_cidrs {
			Some(cidrs) if !cidrs.is_empty() => cidrs,
			_ => spec.pod_cidr.into_iter().collect(),
		})
		.unwrap_or_default();

	ClusterNodeRecord {
		name,
		annotations,
		addresses,
		pod_cidrs,
	}
}
