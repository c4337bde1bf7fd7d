// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::sync::Arc;
use wgmesh_common::{
	AnnotationCodec, ClusterNodeRecord, NodeAddress, Peer, WgKeyPair, WgPrivateKey, WgPublicKey,
	INTERNAL_IP, IP_ANNOTATION, PUBLIC_KEY_ANNOTATION,
};
use wgmesh_device::MockDevice;
use wgmesh_k8s::MockNodeClient;
use wgmesh_reconciler::{DeviceSynchronizer, LocalNode, NodeReconciler, PeerCache};

pub const LOCAL: &str = "node-a";

pub fn key(seed: u8) -> String {
	WgPublicKey::from_bytes([seed; 32]).to_base64()
}

pub fn local_keypair() -> WgKeyPair {
	WgKeyPair::from_private_key(WgPrivateKey::from_bytes([1u8; 32]))
}

pub fn local_node() -> LocalNode {
	LocalNode::new(LOCAL, local_keypair(), "100.64.0.0/16", 51820)
}

/// A node that has published everything the mesh needs.
pub fn ready_node(name: &str, seed: u8) -> ClusterNodeRecord {
	let mut node = bare_node(name, seed);
	node.annotations
		.insert(IP_ANNOTATION.to_string(), format!("100.64.0.{seed}"));
	node.annotations
		.insert(PUBLIC_KEY_ANNOTATION.to_string(), key(seed));
	node
}

/// A node with an address and pod range but no mesh annotations yet.
pub fn bare_node(name: &str, seed: u8) -> ClusterNodeRecord {
	let mut node = ClusterNodeRecord::new(name);
	node.addresses
		.push(NodeAddress::new(format!("10.240.0.{seed}"), INTERNAL_IP));
	node.pod_cidrs.push(format!("10.244.{seed}.0/24"));
	node
}

pub fn peer_for(node: &ClusterNodeRecord) -> Peer {
	AnnotationCodec::default().decode(node).unwrap()
}

pub fn reconciler(client: &Arc<MockNodeClient>, device: &Arc<MockDevice>) -> Arc<NodeReconciler> {
	Arc::new(NodeReconciler::new(
		client.clone(),
		DeviceSynchronizer::new(device.clone(), "wg0"),
		Arc::new(PeerCache::new()),
		AnnotationCodec::default(),
		local_node(),
	))
}
