// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! [`DeviceControl`] over the `wg(8)` command line tool.

use async_trait::async_trait;
use ipnet::IpNet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use wgmesh_common::Peer;

use crate::control::{DeviceControl, DeviceSnapshot, DeviceUpdate, PeerOperation};
use crate::error::DeviceError;

const NONE: &str = "(none)";

pub struct WgCommand {
	binary: String,
	timeout: Duration,
}

impl WgCommand {
	pub fn new(timeout: Duration) -> Self {
		Self::with_binary("wg", timeout)
	}

	pub fn with_binary(binary: impl Into<String>, timeout: Duration) -> Self {
		Self {
			binary: binary.into(),
			timeout,
		}
	}

	async fn run(&self, args: &[String]) -> Result<String, DeviceError> {
		let command = format!("{} {}", self.binary, args.first().map(String::as_str).unwrap_or(""));
		let output = timeout(
			self.timeout,
			Command::new(&self.binary)
				.args(args)
				.kill_on_drop(true)
				.output(),
		)
		.await
		.map_err(|_| DeviceError::Timeout {
			command: command.clone(),
		})?
		.map_err(|source| DeviceError::Spawn {
			command: command.clone(),
			source,
		})?;

		if !output.status.success() {
			return Err(DeviceError::Failed {
				command,
				status: output.status.to_string(),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

#[async_trait]
impl DeviceControl for WgCommand {
	#[instrument(skip(self))]
	async fn list_device(&self, name: &str) -> Result<DeviceSnapshot, DeviceError> {
		let stdout = self
			.run(&["show".to_string(), name.to_string(), "dump".to_string()])
			.await?;
		parse_dump(&stdout)
	}

	#[instrument(skip(self, update), fields(operations = update.peers.len()))]
	async fn configure_device(&self, name: &str, update: DeviceUpdate) -> Result<(), DeviceError> {
		if update.is_empty() {
			debug!("nothing to configure");
			return Ok(());
		}
		self.run(&set_args(name, &update)).await?;
		Ok(())
	}
}

/// Arguments for a single `wg set` call applying `update`.
pub fn set_args(device: &str, update: &DeviceUpdate) -> Vec<String> {
	let mut args = vec!["set".to_string(), device.to_string()];
	if let Some(port) = update.listen_port {
		args.push("listen-port".to_string());
		args.push(port.to_string());
	}

	for operation in &update.peers {
		args.push("peer".to_string());
		match operation {
			PeerOperation::AddOrUpdate(peer) => {
				args.push(peer.public_key.clone());
				if let Some(endpoint) = peer.endpoint {
					args.push("endpoint".to_string());
					args.push(endpoint.to_string());
				}
				args.push("allowed-ips".to_string());
				args.push(peer.allowed_ips_joined(","));
			}
			PeerOperation::Remove { identity } => {
				args.push(identity.clone());
				args.push("remove".to_string());
			}
		}
	}

	args
}

/// Parse `wg show <dev> dump`.
///
/// The first line describes the interface (private key, public key, listen
/// port, fwmark); every following line is a peer (public key, preshared key,
/// endpoint, allowed ips, latest handshake, rx, tx, keepalive).
pub fn parse_dump(output: &str) -> Result<DeviceSnapshot, DeviceError> {
	let mut lines = output.lines().filter(|l| !l.trim().is_empty());
	let interface = lines
		.next()
		.ok_or_else(|| DeviceError::Parse("empty output".to_string()))?;
	let fields: Vec<&str> = interface.split('\t').collect();
	if fields.len() < 3 {
		return Err(DeviceError::Parse(format!(
			"interface line has {} fields",
			fields.len()
		)));
	}

	let public_key = Some(fields[1]).filter(|k| *k != NONE).map(str::to_string);
	let listen_port = fields[2]
		.parse()
		.map_err(|_| DeviceError::Parse(format!("bad listen port {:?}", fields[2])))?;

	let mut peers = Vec::new();
	for line in lines {
		let fields: Vec<&str> = line.split('\t').collect();
		if fields.len() < 4 {
			return Err(DeviceError::Parse(format!(
				"peer line has {} fields",
				fields.len()
			)));
		}

		let endpoint = match fields[2] {
			NONE => None,
			raw => match raw.parse::<SocketAddr>() {
				Ok(addr) => Some(addr),
				Err(_) => {
					warn!(endpoint = raw, "ignoring unparseable peer endpoint");
					None
				}
			},
		};

		let allowed_ips = match fields[3] {
			NONE => Vec::new(),
			raw => raw
				.split(',')
				.filter_map(|s| s.trim().parse::<IpNet>().ok())
				.collect(),
		};

		peers.push(Peer::new(fields[0], allowed_ips, endpoint));
	}

	Ok(DeviceSnapshot {
		public_key,
		listen_port,
		peers,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	const DUMP: &str = "cHJpdmF0ZQ==\tAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\t51820\toff\n\
		AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=\t(none)\t10.240.0.4:51820\t10.244.1.0/24,100.64.0.2/32\t0\t0\t0\toff\n\
		AwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwM=\t(none)\t(none)\t(none)\t0\t0\t0\toff\n";

	#[test]
	fn parses_dump_output() {
		let snapshot = parse_dump(DUMP).unwrap();
		assert_eq!(snapshot.listen_port, 51820);
		assert_eq!(
			snapshot.public_key.as_deref(),
			Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
		);
		assert_eq!(snapshot.peers.len(), 2);

		let first = &snapshot.peers[0];
		assert_eq!(first.endpoint, Some("10.240.0.4:51820".parse().unwrap()));
		assert_eq!(first.allowed_ips.len(), 2);

		let second = &snapshot.peers[1];
		assert_eq!(second.endpoint, None);
		assert!(second.allowed_ips.is_empty());
	}

	#[test]
	fn empty_dump_is_an_error() {
		assert!(matches!(parse_dump(""), Err(DeviceError::Parse(_))));
	}

	#[test]
	fn truncated_peer_line_is_an_error() {
		let dump = "priv\tpub\t51820\toff\nkey\t(none)\n";
		assert!(matches!(parse_dump(dump), Err(DeviceError::Parse(_))));
	}

	#[test]
	fn set_args_for_add_and_remove() {
		let peer = Peer::new(
			"AgIC=",
			["100.64.0.2/32".parse().unwrap(), "10.244.1.0/24".parse().unwrap()],
			Some("10.240.0.4:51820".parse().unwrap()),
		);
		let update = DeviceUpdate {
			listen_port: Some(51820),
			peers: vec![
				PeerOperation::AddOrUpdate(peer),
				PeerOperation::Remove {
					identity: "AwMD=".to_string(),
				},
			],
		};

		assert_eq!(
			set_args("wg0", &update),
			vec![
				"set",
				"wg0",
				"listen-port",
				"51820",
				"peer",
				"AgIC=",
				"endpoint",
				"10.240.0.4:51820",
				"allowed-ips",
				"10.244.1.0/24,100.64.0.2/32",
				"peer",
				"AwMD=",
				"remove",
			]
		);
	}

	#[tokio::test]
	async fn missing_binary_is_spawn_error() {
		let wg = WgCommand::with_binary("/nonexistent/wg", Duration::from_secs(1));
		let result = wg.list_device("wg0").await;
		assert!(matches!(result, Err(DeviceError::Spawn { .. })));
	}

	#[tokio::test]
	async fn empty_update_runs_nothing() {
		let wg = WgCommand::with_binary("/nonexistent/wg", Duration::from_secs(1));
		wg.configure_device("wg0", DeviceUpdate::default())
			.await
			.unwrap();
	}
}
