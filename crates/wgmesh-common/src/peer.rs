// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::keys::WgPrivateKey;
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

pub const DEFAULT_LISTEN_PORT: u16 = 51820;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
	#[error("peer has no public key")]
	MissingIdentity,

	#[error("peer {0} has no allowed IPs")]
	NoAllowedIps(String),
}

/// A remote mesh participant as the device and the wg-quick file see it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
	/// Base64 public key; the cache key.
	pub public_key: String,
	pub allowed_ips: BTreeSet<IpNet>,
	pub endpoint: Option<SocketAddr>,
}

impl Peer {
	pub fn new(
		public_key: impl Into<String>,
		allowed_ips: impl IntoIterator<Item = IpNet>,
		endpoint: Option<SocketAddr>,
	) -> Self {
		Self {
			public_key: public_key.into(),
			allowed_ips: allowed_ips.into_iter().map(|net| net.trunc()).collect(),
			endpoint,
		}
	}

	pub fn validate(&self) -> Result<(), PeerError> {
		if self.public_key.trim().is_empty() {
			return Err(PeerError::MissingIdentity);
		}
		if self.allowed_ips.is_empty() {
			return Err(PeerError::NoAllowedIps(self.public_key.clone()));
		}
		Ok(())
	}

	pub fn is_valid(&self) -> bool {
		self.validate().is_ok()
	}

	pub fn allowed_ips_joined(&self, sep: &str) -> String {
		self
			.allowed_ips
			.iter()
			.map(|net| net.to_string())
			.collect::<Vec<_>>()
			.join(sep)
	}
}

impl fmt::Display for Peer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} [{}]", self.public_key, self.allowed_ips_joined(", "))?;
		if let Some(endpoint) = self.endpoint {
			write!(f, " via {endpoint}")?;
		}
		Ok(())
	}
}

/// Desired configuration of the local interface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostInterface {
	/// Kept textual: wg-quick accepts both `a.b.c.d` and `a.b.c.d/len`.
	pub address: String,
	pub private_key: Option<WgPrivateKey>,
	pub listen_port: u16,
}

impl HostInterface {
	pub fn new(address: impl Into<String>, private_key: WgPrivateKey, listen_port: u16) -> Self {
		Self {
			address: address.into(),
			private_key: Some(private_key),
			listen_port,
		}
	}

	/// Whether a running device built from `self` would differ from one built
	/// from `other` in a way only a restart can fix. The listen port is not
	/// compared: a lenient parse of a bad port reads back as zero and must not
	/// cause a rewrite loop.
	pub fn differs_materially(&self, other: &HostInterface) -> bool {
		self.address.trim() != other.address.trim() || self.private_key != other.private_key
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn net(s: &str) -> IpNet {
		s.parse().unwrap()
	}

	#[test]
	fn allowed_ips_are_normalized_and_deduplicated() {
		let peer = Peer::new(
			"key",
			[net("10.244.1.7/24"), net("10.244.1.0/24"), net("100.64.0.2/32")],
			None,
		);
		assert_eq!(peer.allowed_ips.len(), 2);
		assert!(peer.allowed_ips.contains(&net("10.244.1.0/24")));
	}

	#[test]
	fn equality_ignores_allowed_ip_order() {
		let a = Peer::new("key", [net("10.0.0.0/24"), net("100.64.0.2/32")], None);
		let b = Peer::new("key", [net("100.64.0.2/32"), net("10.0.0.0/24")], None);
		assert_eq!(a, b);
	}

	#[test]
	fn validation_requires_identity_and_destinations() {
		let no_key = Peer::new(" ", [net("100.64.0.2/32")], None);
		assert_eq!(no_key.validate(), Err(PeerError::MissingIdentity));

		let no_ips = Peer::new("key", Vec::<IpNet>::new(), None);
		assert_eq!(
			no_ips.validate(),
			Err(PeerError::NoAllowedIps("key".to_string()))
		);
	}

	#[test]
	fn listen_port_is_not_material() {
		let key = WgPrivateKey::from_bytes([1u8; 32]);
		let a = HostInterface::new("100.64.0.1", key.clone(), DEFAULT_LISTEN_PORT);
		let mut b = a.clone();
		b.listen_port = 0;
		assert!(!a.differs_materially(&b));
		assert_ne!(a, b);

		b.address = "100.64.0.9".to_string();
		assert!(a.differs_materially(&b));
	}

	#[test]
	fn missing_private_key_is_material() {
		let key = WgPrivateKey::from_bytes([1u8; 32]);
		let a = HostInterface::new("100.64.0.1", key, DEFAULT_LISTEN_PORT);
		assert!(a.differs_materially(&HostInterface::default()));
	}
}
