// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mapping between cluster node metadata and [`Peer`] records.

use crate::ip::host_route;
use crate::keys::WgPublicKey;
use crate::peer::{Peer, DEFAULT_LISTEN_PORT};
use ipnet::IpNet;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

pub const IP_ANNOTATION: &str = "wireguard-ip";
pub const PUBLIC_KEY_ANNOTATION: &str = "wireguard-publickey";
pub const INTERNAL_IP: &str = "InternalIP";

/// One entry of a node's reported addresses (`InternalIP`, `ExternalIP`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
	pub address: String,
	pub kind: String,
}

impl NodeAddress {
	pub fn new(address: impl Into<String>, kind: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			kind: kind.into(),
		}
	}
}

/// The parts of a cluster node object the mesh reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterNodeRecord {
	pub name: String,
	pub annotations: BTreeMap<String, String>,
	pub addresses: Vec<NodeAddress>,
	pub pod_cidrs: Vec<String>,
}

impl ClusterNodeRecord {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	pub fn internal_ip(&self) -> Option<&str> {
		self.addresses
			.iter()
			.find(|a| a.kind == INTERNAL_IP)
			.map(|a| a.address.as_str())
	}

	/// First IPv4 `InternalIP`, skipping IPv6 entries on dual-stack nodes.
	pub fn internal_ipv4(&self) -> Option<Ipv4Addr> {
		self.addresses
			.iter()
			.filter(|a| a.kind == INTERNAL_IP)
			.find_map(|a| a.address.trim().parse::<Ipv4Addr>().ok())
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
	/// The node has not published what the mesh needs yet.
	#[error("node {node} missing {field}")]
	MissingMetadata { node: String, field: String },

	#[error("node {node} has malformed {field} {value:?}: {reason}")]
	MalformedValue {
		node: String,
		field: String,
		value: String,
		reason: String,
	},
}

impl CodecError {
	pub fn is_missing_metadata(&self) -> bool {
		matches!(self, CodecError::MissingMetadata { .. })
	}

	fn missing(node: &str, field: &str) -> Self {
		CodecError::MissingMetadata {
			node: node.to_string(),
			field: field.to_string(),
		}
	}

	fn malformed(node: &str, field: &str, value: &str, reason: impl ToString) -> Self {
		CodecError::MalformedValue {
			node: node.to_string(),
			field: field.to_string(),
			value: value.to_string(),
			reason: reason.to_string(),
		}
	}
}

/// Annotation key names and the tunnel port peers are dialled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationCodec {
	pub ip_key: String,
	pub public_key_key: String,
	pub listen_port: u16,
}

impl Default for AnnotationCodec {
	fn default() -> Self {
		Self {
			ip_key: IP_ANNOTATION.to_string(),
			public_key_key: PUBLIC_KEY_ANNOTATION.to_string(),
			listen_port: DEFAULT_LISTEN_PORT,
		}
	}
}

impl AnnotationCodec {
	pub fn new(
		ip_key: impl Into<String>,
		public_key_key: impl Into<String>,
		listen_port: u16,
	) -> Self {
		Self {
			ip_key: ip_key.into(),
			public_key_key: public_key_key.into(),
			listen_port,
		}
	}

	/// Build the peer a node describes.
	///
	/// Absent annotations or a missing `InternalIP` mean the node is not ready
	/// and yield [`CodecError::MissingMetadata`]; values that are present but
	/// unparseable yield [`CodecError::MalformedValue`].
	pub fn decode(&self, node: &ClusterNodeRecord) -> Result<Peer, CodecError> {
		let name = node.name.as_str();

		let ip = node
			.annotations
			.get(&self.ip_key)
			.ok_or_else(|| CodecError::missing(name, &self.ip_key))?;
		let public_key = node
			.annotations
			.get(&self.public_key_key)
			.ok_or_else(|| CodecError::missing(name, &self.public_key_key))?;
		let internal_ip = node
			.internal_ip()
			.ok_or_else(|| CodecError::missing(name, INTERNAL_IP))?;

		let key = WgPublicKey::from_base64(public_key)
			.map_err(|e| CodecError::malformed(name, &self.public_key_key, public_key, e))?;

		let overlay: IpAddr = ip
			.trim()
			.parse()
			.map_err(|e| CodecError::malformed(name, &self.ip_key, ip, e))?;

		let mut allowed = Vec::with_capacity(node.pod_cidrs.len() + 1);
		for cidr in &node.pod_cidrs {
			let net: IpNet = cidr
				.trim()
				.parse()
				.map_err(|e| CodecError::malformed(name, "podCIDR", cidr, e))?;
			allowed.push(net);
		}
		allowed.push(host_route(overlay));

		let endpoint_ip: IpAddr = internal_ip
			.trim()
			.parse()
			.map_err(|e| CodecError::malformed(name, INTERNAL_IP, internal_ip, e))?;

		Ok(Peer::new(
			key.to_base64(),
			allowed,
			Some(SocketAddr::new(endpoint_ip, self.listen_port)),
		))
	}

	/// Write the local host's overlay address and public key into
	/// `annotations`. Returns whether anything changed.
	pub fn encode(
		&self,
		overlay_ip: &str,
		public_key: &WgPublicKey,
		annotations: &mut BTreeMap<String, String>,
	) -> bool {
		let mut changed = set_if_different(annotations, &self.ip_key, overlay_ip.to_string());
		changed |= set_if_different(annotations, &self.public_key_key, public_key.to_base64());
		changed
	}
}

fn set_if_different(map: &mut BTreeMap<String, String>, key: &str, value: String) -> bool {
	if map.get(key) == Some(&value) {
		return false;
	}
	map.insert(key.to_string(), value);
	true
}
