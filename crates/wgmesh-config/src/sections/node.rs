// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local node identity section.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfigLayer {
	pub name: Option<String>,
	pub underlay_ip: Option<String>,
}

impl NodeConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.name.is_some() {
			self.name = other.name;
		}
		if other.underlay_ip.is_some() {
			self.underlay_ip = other.underlay_ip;
		}
	}

	pub fn finalize(self) -> Result<NodeConfig, ConfigError> {
		let name = self
			.name
			.map(|n| n.trim().to_string())
			.filter(|n| !n.is_empty())
			.ok_or_else(|| ConfigError::MissingEnvVar("WGMESH_NODE_NAME".to_string()))?;

		let underlay_ip = match self.underlay_ip {
			Some(raw) => Some(raw.trim().parse::<IpAddr>().map_err(|e| {
				ConfigError::InvalidValue {
					key: "node.underlay_ip".to_string(),
					message: format!("'{raw}': {e}"),
				}
			})?),
			None => None,
		};

		Ok(NodeConfig { name, underlay_ip })
	}
}

/// Who this agent runs as. Without an explicit underlay address the node's
/// `InternalIP` from the cluster is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
	pub name: String,
	pub underlay_ip: Option<IpAddr>,
}
