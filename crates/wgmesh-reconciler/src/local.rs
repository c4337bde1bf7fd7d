// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The host this agent runs on.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info, instrument};
use wgmesh_common::{
	derive_overlay_ip, AnnotationCodec, ClusterNodeRecord, CodecError, HostInterface, WgKeyPair,
	INTERNAL_IP,
};
use wgmesh_k8s::NodeClient;

use crate::error::{ReconcileError, Result};

#[derive(Clone)]
pub struct LocalNode {
	pub name: String,
	pub keypair: WgKeyPair,
	pub overlay_cidr: String,
	/// Overrides the node's `InternalIP` as the derivation input.
	pub underlay_ip: Option<IpAddr>,
	pub listen_port: u16,
}

impl LocalNode {
	pub fn new(
		name: impl Into<String>,
		keypair: WgKeyPair,
		overlay_cidr: impl Into<String>,
		listen_port: u16,
	) -> Self {
		Self {
			name: name.into(),
			keypair,
			overlay_cidr: overlay_cidr.into(),
			underlay_ip: None,
			listen_port,
		}
	}

	pub fn with_underlay_ip(mut self, underlay_ip: Option<IpAddr>) -> Self {
		self.underlay_ip = underlay_ip;
		self
	}

	pub fn is_local(&self, node: &str) -> bool {
		self.name == node
	}

	/// Derived from the configured underlay, else the node's first IPv4
	/// `InternalIP`. An IPv6-only node yields `UnsupportedUnderlay`.
	pub fn overlay_address(&self, record: &ClusterNodeRecord) -> Result<Ipv4Addr> {
		let underlay = match self.underlay_ip {
			Some(ip) => ip.to_string(),
			None => record
				.internal_ipv4()
				.map(|ip| ip.to_string())
				.or_else(|| record.internal_ip().map(str::to_string))
				.ok_or_else(|| CodecError::MissingMetadata {
					node: record.name.clone(),
					field: INTERNAL_IP.to_string(),
				})?,
		};

		derive_overlay_ip(&underlay, &self.overlay_cidr).ok_or_else(|| {
			ReconcileError::UnsupportedUnderlay {
				underlay,
				cidr: self.overlay_cidr.clone(),
			}
		})
	}

	pub fn host_interface(&self, overlay_address: Ipv4Addr) -> HostInterface {
		HostInterface::new(
			overlay_address.to_string(),
			self.keypair.private_key().clone(),
			self.listen_port,
		)
	}

	/// Publish this host's overlay address and public key on its own node
	/// object. Only the two mesh annotations are patched, and only when one
	/// of them actually changed. Returns the derived overlay address and
	/// whether a write happened.
	#[instrument(skip_all, fields(node = %self.name))]
	pub async fn annotate(
		&self,
		codec: &AnnotationCodec,
		client: &dyn NodeClient,
		record: &ClusterNodeRecord,
	) -> Result<(Ipv4Addr, bool)> {
		let address = self.overlay_address(record)?;

		let mut annotations = record.annotations.clone();
		if !codec.encode(
			&address.to_string(),
			self.keypair.public_key(),
			&mut annotations,
		) {
			debug!(%address, "node annotations already current");
			return Ok((address, false));
		}

		let patch: BTreeMap<String, String> = [&codec.ip_key, &codec.public_key_key]
			.into_iter()
			.filter_map(|key| annotations.get(key).map(|v| (key.clone(), v.clone())))
			.collect();
		client.patch_node_annotations(&self.name, &patch).await?;
		info!(%address, "published overlay annotations");
		Ok((address, true))
	}
}

impl std::fmt::Debug for LocalNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LocalNode")
			.field("name", &self.name)
			.field("public_key", self.keypair.public_key())
			.field("overlay_cidr", &self.overlay_cidr)
			.field("underlay_ip", &self.underlay_ip)
			.field("listen_port", &self.listen_port)
			.finish()
	}
}
