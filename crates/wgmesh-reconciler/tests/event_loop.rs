// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod support;

use std::sync::Arc;
use std::time::Duration;
use support::*;
use tokio_util::sync::CancellationToken;
use wgmesh_common::PUBLIC_KEY_ANNOTATION;
use wgmesh_device::{MockDevice, PeerOperation};
use wgmesh_k8s::{MockNodeClient, NodeClient, NodeEvent};
use wgmesh_reconciler::{Controller, ReconcileAction};

fn controller(client: &Arc<MockNodeClient>, device: &Arc<MockDevice>) -> Controller {
	Controller::new(reconciler(client, device), 4, Duration::from_secs(10))
}

#[tokio::test]
async fn same_event_twice_configures_device_once() {
	let client = Arc::new(MockNodeClient::new());
	let device = Arc::new(MockDevice::new());

	client.upsert_node(ready_node("node-b", 2));
	client.emit(Ok(NodeEvent::Applied(ready_node("node-b", 2))));
	client.close_watch();

	controller(&client, &device)
		.run(client.watch_nodes(), CancellationToken::new())
		.await;

	assert_eq!(device.configure_calls(), 1);
	assert_eq!(device.peer(&key(2)), Some(peer_for(&ready_node("node-b", 2))));
}

#[tokio::test]
async fn burst_for_one_node_coalesces_into_one_follow_up() {
	let client = Arc::new(MockNodeClient::new());
	let device = Arc::new(MockDevice::new());

	for _ in 0..5 {
		client.upsert_node(ready_node("node-b", 2));
	}
	client.close_watch();

	controller(&client, &device)
		.run(client.watch_nodes(), CancellationToken::new())
		.await;

	assert_eq!(client.get_calls(), 2);
	assert_eq!(device.configure_calls(), 1);
}

#[tokio::test]
async fn deleted_node_is_removed_exactly_once() {
	let client = Arc::new(MockNodeClient::new());
	let device = Arc::new(MockDevice::new());
	let reconciler = reconciler(&client, &device);

	client.upsert_node(ready_node("node-b", 2));
	reconciler.reconcile("node-b").await.unwrap();
	client.remove_node("node-b");

	assert_eq!(
		reconciler.reconcile("node-b").await.unwrap(),
		ReconcileAction::Removed
	);
	assert_eq!(
		reconciler.reconcile("node-b").await.unwrap(),
		ReconcileAction::NothingToRemove
	);

	let removals: Vec<_> = device
		.operations()
		.into_iter()
		.filter(|op| matches!(op, PeerOperation::Remove { .. }))
		.collect();
	assert_eq!(
		removals,
		vec![PeerOperation::Remove {
			identity: key(2)
		}]
	);
	assert!(device.peers().is_empty());
}

#[tokio::test]
async fn unknown_node_deletion_makes_no_device_call() {
	let client = Arc::new(MockNodeClient::new());
	let device = Arc::new(MockDevice::new());

	assert_eq!(
		reconciler(&client, &device).reconcile("ghost").await.unwrap(),
		ReconcileAction::NothingToRemove
	);
	assert_eq!(device.configure_calls(), 0);
}

#[tokio::test]
async fn node_without_key_is_never_cached_or_applied() {
	let mut unready = ready_node("node-b", 2);
	unready.annotations.remove(PUBLIC_KEY_ANNOTATION);
	let client = Arc::new(MockNodeClient::with_nodes([unready]));
	let device = Arc::new(MockDevice::new());
	let reconciler = reconciler(&client, &device);

	let err = reconciler.reconcile("node-b").await.unwrap_err();
	assert!(err.is_missing_metadata());
	assert_eq!(device.configure_calls(), 0);
	assert!(reconciler.cache().is_empty().await);
}

#[tokio::test]
async fn rotated_key_replaces_old_peer() {
	let client = Arc::new(MockNodeClient::with_nodes([ready_node("node-b", 2)]));
	let device = Arc::new(MockDevice::new());
	let reconciler = reconciler(&client, &device);
	reconciler.reconcile("node-b").await.unwrap();

	let mut rotated = ready_node("node-b", 2);
	rotated
		.annotations
		.insert(PUBLIC_KEY_ANNOTATION.to_string(), key(9));
	client.upsert_node(rotated);

	assert_eq!(
		reconciler.reconcile("node-b").await.unwrap(),
		ReconcileAction::Applied
	);
	let keys: Vec<String> = device.peers().into_iter().map(|p| p.public_key).collect();
	assert_eq!(keys, vec![key(9)]);
	assert_eq!(
		reconciler.cache().identity_for_node("node-b").await,
		Some(key(9))
	);
	assert_eq!(reconciler.cache().len().await, 1);
}

#[tokio::test]
async fn hydration_retracts_peers_unknown_to_cluster() {
	let known = ready_node("node-b", 2);
	let orphan = peer_for(&ready_node("node-x", 7));
	let client = Arc::new(MockNodeClient::with_nodes([known.clone()]));
	let device = Arc::new(MockDevice::with_peers([peer_for(&known), orphan.clone()]));
	let reconciler = reconciler(&client, &device);

	assert_eq!(
		reconciler.reconcile("node-b").await.unwrap(),
		ReconcileAction::Unchanged
	);
	assert!(device.peer(&orphan.public_key).is_none());
	assert!(device.peer(&key(2)).is_some());
	assert_eq!(
		device.operations(),
		vec![PeerOperation::Remove {
			identity: orphan.public_key.clone()
		}]
	);
}

#[tokio::test(start_paused = true)]
async fn failed_reconcile_is_requeued() {
	let client = Arc::new(MockNodeClient::new());
	let device = Arc::new(MockDevice::new());
	device.set_fail_configure(true);
	client.upsert_node(ready_node("node-b", 2));

	let cancel = CancellationToken::new();
	let task = tokio::spawn(
		controller(&client, &device).run(client.watch_nodes(), cancel.clone()),
	);

	tokio::time::sleep(Duration::from_secs(1)).await;
	assert_eq!(device.configure_calls(), 1);
	assert!(device.peers().is_empty());

	device.set_fail_configure(false);
	tokio::time::sleep(Duration::from_secs(10)).await;
	assert_eq!(device.configure_calls(), 2);
	assert!(device.peer(&key(2)).is_some());

	cancel.cancel();
	task.await.unwrap();
}

#[tokio::test]
async fn local_node_event_publishes_annotations() {
	let client = Arc::new(MockNodeClient::new());
	let device = Arc::new(MockDevice::new());
	client.upsert_node(bare_node(LOCAL, 1));
	client.close_watch();

	controller(&client, &device)
		.run(client.watch_nodes(), CancellationToken::new())
		.await;

	let stored = client.node(LOCAL).unwrap();
	assert_eq!(
		stored.annotations.get(PUBLIC_KEY_ANNOTATION),
		Some(&local_keypair().public_key().to_base64())
	);
	assert_eq!(device.configure_calls(), 0);
}
