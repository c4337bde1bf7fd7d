// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconciliation timing section.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncConfigLayer {
	pub interval_secs: Option<u64>,
	pub requeue_after_secs: Option<u64>,
	pub max_concurrent_reconciles: Option<usize>,
	pub request_timeout_secs: Option<u64>,
}

impl SyncConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.interval_secs.is_some() {
			self.interval_secs = other.interval_secs;
		}
		if other.requeue_after_secs.is_some() {
			self.requeue_after_secs = other.requeue_after_secs;
		}
		if other.max_concurrent_reconciles.is_some() {
			self.max_concurrent_reconciles = other.max_concurrent_reconciles;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
	}

	pub fn finalize(self) -> Result<SyncConfig, ConfigError> {
		let defaults = SyncConfig::default();
		let config = SyncConfig {
			interval_secs: self.interval_secs.unwrap_or(defaults.interval_secs),
			requeue_after_secs: self.requeue_after_secs.unwrap_or(defaults.requeue_after_secs),
			max_concurrent_reconciles: self
				.max_concurrent_reconciles
				.unwrap_or(defaults.max_concurrent_reconciles),
			request_timeout_secs: self
				.request_timeout_secs
				.unwrap_or(defaults.request_timeout_secs),
		};

		for (key, value) in [
			("sync.interval_secs", config.interval_secs),
			("sync.requeue_after_secs", config.requeue_after_secs),
			("sync.max_concurrent_reconciles", config.max_concurrent_reconciles as u64),
			("sync.request_timeout_secs", config.request_timeout_secs),
		] {
			if value == 0 {
				return Err(ConfigError::InvalidValue {
					key: key.to_string(),
					message: "must be greater than zero".to_string(),
				});
			}
		}

		Ok(config)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
	pub interval_secs: u64,
	pub requeue_after_secs: u64,
	pub max_concurrent_reconciles: usize,
	pub request_timeout_secs: u64,
}

impl SyncConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.interval_secs)
	}

	pub fn requeue_after(&self) -> Duration {
		Duration::from_secs(self.requeue_after_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			interval_secs: 5,
			requeue_after_secs: 10,
			max_concurrent_reconciles: 4,
			request_timeout_secs: 10,
		}
	}
}
