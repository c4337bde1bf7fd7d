// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! On-host file locations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_config_file() -> PathBuf {
	PathBuf::from("/etc/wireguard/wg0.conf")
}

fn default_update_file() -> PathBuf {
	PathBuf::from("/etc/wireguard/update")
}

fn default_private_key_file() -> PathBuf {
	PathBuf::from("/etc/wireguard/privatekey")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathsConfigLayer {
	pub config_file: Option<PathBuf>,
	pub update_file: Option<PathBuf>,
	pub private_key_file: Option<PathBuf>,
	pub public_key_file: Option<PathBuf>,
}

impl PathsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.config_file.is_some() {
			self.config_file = other.config_file;
		}
		if other.update_file.is_some() {
			self.update_file = other.update_file;
		}
		if other.private_key_file.is_some() {
			self.private_key_file = other.private_key_file;
		}
		if other.public_key_file.is_some() {
			self.public_key_file = other.public_key_file;
		}
	}

	pub fn finalize(self) -> PathsConfig {
		PathsConfig {
			config_file: self.config_file.unwrap_or_else(default_config_file),
			update_file: self.update_file.unwrap_or_else(default_update_file),
			private_key_file: self
				.private_key_file
				.unwrap_or_else(default_private_key_file),
			public_key_file: self.public_key_file,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
	/// wg-quick file the supervisor brings the device up from.
	pub config_file: PathBuf,
	/// Sentinel written after the config file changes.
	pub update_file: PathBuf,
	pub private_key_file: PathBuf,
	/// When set, overrides the public key derived from the private key.
	pub public_key_file: Option<PathBuf>,
}

impl Default for PathsConfig {
	fn default() -> Self {
		PathsConfigLayer::default().finalize()
	}
}
