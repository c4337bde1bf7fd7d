// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The wg-quick style file the supervisor brings the device up from.
//!
//! Rendering always produces the fixed layout below. Parsing is lenient:
//! unknown keys, comments and values that do not parse are skipped so a
//! hand-edited file never stops the agent from converging it.
//!
//! ```text
//! [Interface]
//! Address = 100.64.0.1
//! ListenPort = 51820
//! PrivateKey = <base64>
//! [Peer]
//! PublicKey = <base64>
//! AllowedIPs = 10.244.1.0/24, 100.64.0.2/32
//! Endpoint = 10.240.0.4:51820
//! ```

use crate::keys::WgPrivateKey;
use crate::peer::{HostInterface, Peer};
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::net::SocketAddr;
use tracing::warn;

pub const INTERFACE_SECTION: &str = "[Interface]";
pub const PEER_SECTION: &str = "[Peer]";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WireguardTextConfig {
	pub host: HostInterface,
	pub peers: Vec<Peer>,
}

enum Section {
	None,
	Interface,
	Peer,
}

impl WireguardTextConfig {
	pub fn new(host: HostInterface, peers: Vec<Peer>) -> Self {
		Self { host, peers }
	}

	pub fn parse(text: &str) -> Self {
		let mut config = WireguardTextConfig::default();
		let mut section = Section::None;

		for line in text.lines() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			if line == INTERFACE_SECTION {
				section = Section::Interface;
				config.host = HostInterface::default();
				continue;
			}
			if line == PEER_SECTION {
				section = Section::Peer;
				config.peers.push(Peer::new(String::new(), Vec::<IpNet>::new(), None));
				continue;
			}

			let Some((key, value)) = line.split_once('=') else {
				continue;
			};
			let (key, value) = (key.trim(), value.trim());
			if key.is_empty() || key.contains(char::is_whitespace) || value.is_empty() {
				continue;
			}

			match section {
				Section::None => {}
				Section::Interface => apply_interface_key(&mut config.host, key, value),
				Section::Peer => {
					if let Some(peer) = config.peers.last_mut() {
						apply_peer_key(peer, key, value);
					}
				}
			}
		}

		config
	}

	pub fn render(&self) -> String {
		let mut out = String::new();
		out.push_str(INTERFACE_SECTION);
		out.push('\n');
		let _ = writeln!(out, "Address = {}", self.host.address);
		let _ = writeln!(out, "ListenPort = {}", self.host.listen_port);
		if let Some(key) = &self.host.private_key {
			let _ = writeln!(out, "PrivateKey = {}", key.expose_base64());
		}

		for peer in &self.peers {
			out.push_str(PEER_SECTION);
			out.push('\n');
			let _ = writeln!(out, "PublicKey = {}", peer.public_key);
			let _ = writeln!(out, "AllowedIPs = {}", peer.allowed_ips_joined(", "));
			if let Some(endpoint) = peer.endpoint {
				let _ = writeln!(out, "Endpoint = {endpoint}");
			}
		}

		out
	}

	pub fn identities(&self) -> BTreeSet<&str> {
		self.peers.iter().map(|p| p.public_key.as_str()).collect()
	}

	pub fn peer(&self, identity: &str) -> Option<&Peer> {
		self.peers.iter().find(|p| p.public_key == identity)
	}
}

fn apply_interface_key(host: &mut HostInterface, key: &str, value: &str) {
	match key {
		"Address" => host.address = value.to_string(),
		"PrivateKey" => match WgPrivateKey::from_base64(value) {
			Ok(private) => host.private_key = Some(private),
			Err(e) => {
				warn!(error = %e, "ignoring unreadable PrivateKey");
				host.private_key = None;
			}
		},
		"ListenPort" => {
			host.listen_port = value.parse().unwrap_or_else(|_| {
				warn!(value, "unparseable ListenPort, reading as 0");
				0
			})
		}
		_ => {}
	}
}

fn apply_peer_key(peer: &mut Peer, key: &str, value: &str) {
	match key {
		"PublicKey" => peer.public_key = value.to_string(),
		"AllowedIPs" => {
			peer.allowed_ips = value
				.split(',')
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.filter_map(|s| match s.parse::<IpNet>() {
					Ok(net) => Some(net.trunc()),
					Err(_) => {
						warn!(allowed_ip = s, "dropping unparseable AllowedIPs entry");
						None
					}
				})
				.collect();
		}
		"Endpoint" => {
			peer.endpoint = match value.parse::<SocketAddr>() {
				Ok(addr) => Some(addr),
				Err(_) => {
					warn!(endpoint = value, "dropping unparseable Endpoint");
					None
				}
			}
		}
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::WgPublicKey;
	use proptest::prelude::*;

	const INTERFACE: &str = "[Interface]\nAddress = 100.64.0.1\nListenPort = 51820\n";

	fn net(s: &str) -> IpNet {
		s.parse().unwrap()
	}

	fn sample() -> WireguardTextConfig {
		WireguardTextConfig::new(
			HostInterface::new("100.64.0.1", WgPrivateKey::from_bytes([1u8; 32]), 51820),
			vec![
				Peer::new(
					WgPublicKey::from_bytes([2u8; 32]).to_base64(),
					[net("100.64.0.2/32"), net("10.244.1.0/24")],
					Some("10.240.0.4:51820".parse().unwrap()),
				),
				Peer::new(
					WgPublicKey::from_bytes([3u8; 32]).to_base64(),
					[net("100.64.0.3/32"), net("10.244.2.0/24")],
					Some("10.240.0.7:51820".parse().unwrap()),
				),
			],
		)
	}

	#[test]
	fn parses_two_peer_file() {
		let text = format!(
			"{INTERFACE}PrivateKey = {}\n\
			 [Peer]\nPublicKey = base64_publickey1\nAllowedIPs = 100.64.0.2/32, 10.244.1.0/16\nEndpoint = 10.240.0.4:51820\n\
			 [Peer]\nPublicKey = base64_publickey2\nAllowedIPs = 100.64.0.3/32, 10.244.2.0/16\nEndpoint = 10.240.0.7:51820\n",
			WgPrivateKey::from_bytes([1u8; 32]).expose_base64()
		);
		let config = WireguardTextConfig::parse(&text);

		assert_eq!(config.host.address, "100.64.0.1");
		assert_eq!(config.host.listen_port, 51820);
		assert!(config.host.private_key.is_some());
		assert_eq!(config.peers.len(), 2);
		assert_eq!(config.peers[0].public_key, "base64_publickey1");
		assert!(config.peers[0].allowed_ips.contains(&net("100.64.0.2/32")));
		assert!(config.peers[0].allowed_ips.contains(&net("10.244.0.0/16")));
		assert_eq!(
			config.peers[1].endpoint,
			Some("10.240.0.7:51820".parse().unwrap())
		);
	}

	#[test]
	fn render_uses_fixed_layout() {
		let rendered = sample().render();
		let lines: Vec<&str> = rendered.lines().collect();
		assert_eq!(lines[0], "[Interface]");
		assert_eq!(lines[1], "Address = 100.64.0.1");
		assert_eq!(lines[2], "ListenPort = 51820");
		assert!(lines[3].starts_with("PrivateKey = "));
		assert_eq!(lines[4], "[Peer]");
		assert_eq!(lines[6], "AllowedIPs = 10.244.1.0/24, 100.64.0.2/32");
		assert_eq!(lines[7], "Endpoint = 10.240.0.4:51820");
		assert!(rendered.ends_with('\n'));
	}

	#[test]
	fn render_then_parse_restores_config() {
		let config = sample();
		assert_eq!(WireguardTextConfig::parse(&config.render()), config);
	}

	#[test]
	fn malformed_listen_port_reads_as_zero() {
		let config = WireguardTextConfig::parse("[Interface]\nAddress = 100.64.0.1\nListenPort = lots\n");
		assert_eq!(config.host.listen_port, 0);
		assert_eq!(config.host.address, "100.64.0.1");
	}

	#[test]
	fn ignores_comments_unknown_keys_and_preamble() {
		let text = "Address = 1.2.3.4\n\
			# managed by wgmesh\n\n\
			[Interface]\nAddress = 100.64.0.1\nMTU = 1420\n\
			[Peer]\nPublicKey = k\nPersistentKeepalive = 25\nAllowedIPs = 100.64.0.2/32\n";
		let config = WireguardTextConfig::parse(text);
		assert_eq!(config.host.address, "100.64.0.1");
		assert_eq!(config.peers.len(), 1);
		assert_eq!(config.peers[0].public_key, "k");
		assert_eq!(config.peers[0].endpoint, None);
	}

	#[test]
	fn allowed_ips_whitespace_is_insignificant() {
		let config = WireguardTextConfig::parse(
			"[Interface]\n[Peer]\nPublicKey = k\nAllowedIPs=100.64.0.2/32,10.244.1.0/24 ,  bogus\n",
		);
		assert_eq!(config.peers[0].allowed_ips.len(), 2);
	}

	#[test]
	fn empty_input_is_empty_config() {
		assert_eq!(WireguardTextConfig::parse(""), WireguardTextConfig::default());
	}

	proptest! {
		#[test]
		fn peer_sets_survive_rendering(
			octets in prop::collection::btree_set(1u8..=254, 0..8),
			port in any::<u16>(),
		) {
			let peers: Vec<Peer> = octets
				.iter()
				.map(|o| {
					Peer::new(
						WgPublicKey::from_bytes([*o; 32]).to_base64(),
						[net(&format!("100.64.0.{o}/32")), net(&format!("10.244.{o}.0/24"))],
						Some(SocketAddr::from(([10, 240, 0, *o], 51820))),
					)
				})
				.collect();
			let config = WireguardTextConfig::new(
				HostInterface::new("100.64.0.1", WgPrivateKey::from_bytes([7u8; 32]), port),
				peers,
			);
			prop_assert_eq!(WireguardTextConfig::parse(&config.render()), config);
		}
	}
}
