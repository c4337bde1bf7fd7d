// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keeps the wg-quick file in step with the desired state.
//!
//! The device itself is never touched here. When the file has to change it
//! is rewritten atomically and the sentinel file is set to `1`; whatever
//! supervises the device watches the sentinel and restarts the interface.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use wgmesh_common::WireguardTextConfig;

use crate::error::{ReconcileError, Result};

pub const RESTART_SENTINEL: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
	HostChanged,
	PeerMissing(String),
	PeerCountChanged { on_file: usize, desired: usize },
	PeerChanged(String),
}

impl fmt::Display for RestartReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RestartReason::HostChanged => write!(f, "interface address or key changed"),
			RestartReason::PeerMissing(id) => write!(f, "peer {id} not on file"),
			RestartReason::PeerCountChanged { on_file, desired } => {
				write!(f, "peer count {on_file} on file, {desired} desired")
			}
			RestartReason::PeerChanged(id) => write!(f, "peer {id} changed"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvergeOutcome {
	pub rewritten: bool,
	pub reason: Option<RestartReason>,
}

/// Decide whether `desired` differs from `current` enough that the device
/// must be restarted from a rewritten file. Peer order is irrelevant.
pub fn needs_restart(
	current: &WireguardTextConfig,
	desired: &WireguardTextConfig,
) -> Option<RestartReason> {
	if desired.host.differs_materially(&current.host) {
		return Some(RestartReason::HostChanged);
	}

	let on_file = current.identities();
	if let Some(missing) = desired
		.peers
		.iter()
		.find(|p| !on_file.contains(p.public_key.as_str()))
	{
		return Some(RestartReason::PeerMissing(missing.public_key.clone()));
	}

	if current.peers.len() != desired.peers.len() {
		return Some(RestartReason::PeerCountChanged {
			on_file: current.peers.len(),
			desired: desired.peers.len(),
		});
	}

	desired
		.peers
		.iter()
		.find(|p| current.peer(&p.public_key) != Some(*p))
		.map(|p| RestartReason::PeerChanged(p.public_key.clone()))
}

#[derive(Debug, Clone)]
pub struct FileSynchronizer {
	config_path: PathBuf,
	update_path: PathBuf,
}

impl FileSynchronizer {
	pub fn new(config_path: impl Into<PathBuf>, update_path: impl Into<PathBuf>) -> Self {
		Self {
			config_path: config_path.into(),
			update_path: update_path.into(),
		}
	}

	pub fn config_path(&self) -> &Path {
		&self.config_path
	}

	pub fn update_path(&self) -> &Path {
		&self.update_path
	}

	/// An absent file reads as an empty configuration. Invalid UTF-8 is
	/// replaced rather than rejected, so a damaged file still gets rewritten.
	pub async fn read(&self) -> Result<WireguardTextConfig> {
		match tokio::fs::read(&self.config_path).await {
			Ok(bytes) => Ok(WireguardTextConfig::parse(&String::from_utf8_lossy(&bytes))),
			Err(e) if e.kind() == ErrorKind::NotFound => {
				debug!(path = %self.config_path.display(), "config file absent, treating as empty");
				Ok(WireguardTextConfig::default())
			}
			Err(e) => Err(ReconcileError::persistence(&self.config_path, e)),
		}
	}

	#[instrument(skip_all, fields(path = %self.config_path.display()))]
	pub async fn converge(&self, desired: &WireguardTextConfig) -> Result<ConvergeOutcome> {
		let current = self.read().await?;
		let Some(reason) = needs_restart(&current, desired) else {
			debug!(peers = desired.peers.len(), "config file already converged");
			return Ok(ConvergeOutcome::default());
		};

		write_atomic(&self.config_path, desired.render().as_bytes()).await?;
		tokio::fs::write(&self.update_path, RESTART_SENTINEL)
			.await
			.map_err(|e| ReconcileError::persistence(&self.update_path, e))?;

		info!(
			%reason,
			peers = desired.peers.len(),
			sentinel = %self.update_path.display(),
			"config file rewritten, restart requested"
		);
		Ok(ConvergeOutcome {
			rewritten: true,
			reason: Some(reason),
		})
	}
}

/// Write to a temporary sibling, flush it to disk, then rename over `path`.
/// The file holds a private key, so it is created owner-only on unix.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
	let file_name = path
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| "wgmesh".to_string());
	let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

	let mut options = tokio::fs::OpenOptions::new();
	options.write(true).create(true).truncate(true);
	#[cfg(unix)]
	options.mode(0o600);

	let result = async {
		let mut file = options.open(&tmp_path).await?;
		file.write_all(contents).await?;
		file.sync_all().await?;
		drop(file);
		tokio::fs::rename(&tmp_path, path).await
	}
	.await;

	if let Err(e) = result {
		let _ = tokio::fs::remove_file(&tmp_path).await;
		return Err(ReconcileError::persistence(path, e));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use ipnet::IpNet;
	use tempfile::TempDir;
	use wgmesh_common::{HostInterface, Peer, WgPrivateKey};

	fn peer(key: &str, octet: u8) -> Peer {
		Peer::new(
			key,
			[format!("100.64.0.{octet}/32").parse::<IpNet>().unwrap()],
			Some(format!("10.240.0.{octet}:51820").parse().unwrap()),
		)
	}

	fn config(peers: Vec<Peer>) -> WireguardTextConfig {
		WireguardTextConfig::new(
			HostInterface::new("100.64.0.1", WgPrivateKey::from_bytes([1u8; 32]), 51820),
			peers,
		)
	}

	fn files(dir: &TempDir) -> FileSynchronizer {
		FileSynchronizer::new(dir.path().join("wg0.conf"), dir.path().join("update"))
	}

	#[test]
	fn different_peer_set_needs_restart() {
		let current = config(vec![peer("A", 2), peer("B", 3)]);
		let desired = config(vec![peer("A", 2), peer("C", 4)]);
		assert_eq!(
			needs_restart(&current, &desired),
			Some(RestartReason::PeerMissing("C".to_string()))
		);
	}

	#[test]
	fn reordered_peers_do_not_need_restart() {
		let current = config(vec![peer("A", 2), peer("B", 3)]);
		let desired = config(vec![peer("B", 3), peer("A", 2)]);
		assert_eq!(needs_restart(&current, &desired), None);
	}

	#[test]
	fn removed_peer_changes_count() {
		let current = config(vec![peer("A", 2), peer("B", 3)]);
		let desired = config(vec![peer("A", 2)]);
		assert_eq!(
			needs_restart(&current, &desired),
			Some(RestartReason::PeerCountChanged {
				on_file: 2,
				desired: 1
			})
		);
	}

	#[test]
	fn changed_destinations_need_restart() {
		let current = config(vec![peer("A", 2)]);
		let desired = config(vec![peer("A", 9)]);
		assert_eq!(
			needs_restart(&current, &desired),
			Some(RestartReason::PeerChanged("A".to_string()))
		);
	}

	#[test]
	fn host_address_change_needs_restart() {
		let current = config(vec![]);
		let mut desired = config(vec![]);
		desired.host.address = "100.64.0.7".to_string();
		assert_eq!(
			needs_restart(&current, &desired),
			Some(RestartReason::HostChanged)
		);
	}

	#[tokio::test]
	async fn absent_file_reads_empty() {
		let dir = TempDir::new().unwrap();
		assert_eq!(
			files(&dir).read().await.unwrap(),
			WireguardTextConfig::default()
		);
	}

	#[tokio::test]
	async fn converge_writes_file_and_sentinel_once() {
		let dir = TempDir::new().unwrap();
		let sync = files(&dir);
		let desired = config(vec![peer("A", 2), peer("B", 3)]);

		let first = sync.converge(&desired).await.unwrap();
		assert!(first.rewritten);
		assert_eq!(first.reason, Some(RestartReason::HostChanged));
		assert_eq!(
			std::fs::read_to_string(sync.update_path()).unwrap(),
			RESTART_SENTINEL
		);
		assert_eq!(sync.read().await.unwrap(), desired);

		std::fs::remove_file(sync.update_path()).unwrap();
		let second = sync.converge(&desired).await.unwrap();
		assert_eq!(second, ConvergeOutcome::default());
		assert!(!sync.update_path().exists());
	}

	#[tokio::test]
	async fn non_utf8_file_is_rewritten() {
		let dir = TempDir::new().unwrap();
		let sync = files(&dir);
		let desired = config(vec![peer("A", 2)]);
		let mut damaged = b"# caf\xe9\n".to_vec();
		damaged.extend_from_slice(desired.render().as_bytes());
		std::fs::write(sync.config_path(), damaged).unwrap();

		assert_eq!(sync.read().await.unwrap(), desired);
		assert!(!sync.converge(&desired).await.unwrap().rewritten);

		std::fs::write(sync.config_path(), b"[Interface]\nAddress = \xff\xfe\n").unwrap();
		let outcome = sync.converge(&desired).await.unwrap();
		assert!(outcome.rewritten);
		assert_eq!(sync.read().await.unwrap(), desired);
		assert!(sync.update_path().exists());
	}

	#[tokio::test]
	async fn no_temp_file_left_behind() {
		let dir = TempDir::new().unwrap();
		files(&dir).converge(&config(vec![peer("A", 2)])).await.unwrap();

		let names: Vec<String> = std::fs::read_dir(dir.path())
			.unwrap()
			.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
			.collect();
		assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn config_file_is_owner_only() {
		use std::os::unix::fs::PermissionsExt;

		let dir = TempDir::new().unwrap();
		let sync = files(&dir);
		sync.converge(&config(vec![])).await.unwrap();
		let mode = std::fs::metadata(sync.config_path())
			.unwrap()
			.permissions()
			.mode();
		assert_eq!(mode & 0o777, 0o600);
	}

	#[tokio::test]
	async fn unwritable_directory_is_persistence_failure() {
		let dir = TempDir::new().unwrap();
		let sync = FileSynchronizer::new(
			dir.path().join("missing").join("wg0.conf"),
			dir.path().join("update"),
		);
		let err = sync.converge(&config(vec![])).await.unwrap_err();
		assert!(matches!(err, ReconcileError::PersistenceFailed { .. }));
		assert!(!sync.update_path().exists());
	}
}
