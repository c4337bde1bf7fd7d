// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory [`DeviceControl`] for tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use wgmesh_common::Peer;

use crate::control::{DeviceControl, DeviceSnapshot, DeviceUpdate, PeerOperation};
use crate::error::DeviceError;

/// Applies updates to an in-memory peer table and records every call.
#[derive(Default)]
pub struct MockDevice {
	public_key: Option<String>,
	listen_port: Mutex<u16>,
	peers: Mutex<BTreeMap<String, Peer>>,
	operations: Mutex<Vec<PeerOperation>>,
	fail_configure: AtomicBool,
	fail_list: AtomicBool,
	configure_calls: AtomicUsize,
	list_calls: AtomicUsize,
}

impl MockDevice {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_peers(peers: impl IntoIterator<Item = Peer>) -> Self {
		let device = Self::new();
		{
			let mut map = device.peers.lock().unwrap();
			for peer in peers {
				map.insert(peer.public_key.clone(), peer);
			}
		}
		device
	}

	pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
		self.public_key = Some(public_key.into());
		self
	}

	pub fn peers(&self) -> Vec<Peer> {
		self.peers.lock().unwrap().values().cloned().collect()
	}

	pub fn peer(&self, identity: &str) -> Option<Peer> {
		self.peers.lock().unwrap().get(identity).cloned()
	}

	/// Every peer operation applied so far, in order.
	pub fn operations(&self) -> Vec<PeerOperation> {
		self.operations.lock().unwrap().clone()
	}

	pub fn configure_calls(&self) -> usize {
		self.configure_calls.load(Ordering::SeqCst)
	}

	pub fn list_calls(&self) -> usize {
		self.list_calls.load(Ordering::SeqCst)
	}

	pub fn set_fail_configure(&self, failing: bool) {
		self.fail_configure.store(failing, Ordering::SeqCst);
	}

	pub fn set_fail_list(&self, failing: bool) {
		self.fail_list.store(failing, Ordering::SeqCst);
	}
}

#[async_trait]
impl DeviceControl for MockDevice {
	async fn list_device(&self, _name: &str) -> Result<DeviceSnapshot, DeviceError> {
		self.list_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_list.load(Ordering::SeqCst) {
			return Err(DeviceError::Other("injected list failure".to_string()));
		}
		Ok(DeviceSnapshot {
			public_key: self.public_key.clone(),
			listen_port: *self.listen_port.lock().unwrap(),
			peers: self.peers(),
		})
	}

	async fn configure_device(&self, _name: &str, update: DeviceUpdate) -> Result<(), DeviceError> {
		self.configure_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_configure.load(Ordering::SeqCst) {
			return Err(DeviceError::Other("injected configure failure".to_string()));
		}

		if let Some(port) = update.listen_port {
			*self.listen_port.lock().unwrap() = port;
		}
		let mut peers = self.peers.lock().unwrap();
		for operation in &update.peers {
			match operation {
				PeerOperation::AddOrUpdate(peer) => {
					peers.insert(peer.public_key.clone(), peer.clone());
				}
				PeerOperation::Remove { identity } => {
					peers.remove(identity);
				}
			}
		}
		self.operations.lock().unwrap().extend(update.peers);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn peer(key: &str) -> Peer {
		Peer::new(key, ["100.64.0.2/32".parse().unwrap()], None)
	}

	#[tokio::test]
	async fn applies_and_records_operations() {
		let device = MockDevice::new();
		device
			.configure_device("wg0", DeviceUpdate::peer(PeerOperation::AddOrUpdate(peer("a"))))
			.await
			.unwrap();
		device
			.configure_device(
				"wg0",
				DeviceUpdate::peer(PeerOperation::Remove {
					identity: "a".to_string(),
				}),
			)
			.await
			.unwrap();

		assert!(device.peers().is_empty());
		assert_eq!(device.operations().len(), 2);
		assert_eq!(device.configure_calls(), 2);
	}

	#[tokio::test]
	async fn failure_leaves_state_untouched() {
		let device = MockDevice::with_peers([peer("a")]);
		device.set_fail_configure(true);
		let result = device
			.configure_device(
				"wg0",
				DeviceUpdate::peer(PeerOperation::Remove {
					identity: "a".to_string(),
				}),
			)
			.await;

		assert!(result.is_err());
		assert!(device.peer("a").is_some());
		assert!(device.operations().is_empty());
	}
}
