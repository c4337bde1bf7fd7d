// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::AgentConfigLayer;
use crate::sections::{
	LogFormat, LoggingConfigLayer, NodeConfigLayer, OverlayConfigLayer, PathsConfigLayer,
	SyncConfigLayer,
};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/wgmesh/agent.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<AgentConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<AgentConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(AgentConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<AgentConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(AgentConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: AgentConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Convention: WGMESH_<SECTION>_<FIELD>. The node name and address also
/// accept the downward-API style `NODE_NAME` and `NODE_IP`.
pub struct EnvSource {
	lookup: Lookup,
}

impl Default for EnvSource {
	fn default() -> Self {
		Self {
			lookup: Box::new(|name| std::env::var(name).ok()),
		}
	}
}

impl EnvSource {
	/// Read variables from a fixed map instead of the process environment.
	pub fn from_map(vars: HashMap<String, String>) -> Self {
		Self {
			lookup: Box::new(move |name| vars.get(name).cloned()),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn parsed<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
		T::Err: std::fmt::Display,
	{
		match self.var(name) {
			Some(v) => v
				.trim()
				.parse()
				.map(Some)
				.map_err(|e: T::Err| ConfigError::InvalidValue {
					key: name.to_string(),
					message: format!("'{v}': {e}"),
				}),
			None => Ok(None),
		}
	}

	fn load_node(&self) -> NodeConfigLayer {
		NodeConfigLayer {
			name: self
				.var("WGMESH_NODE_NAME")
				.or_else(|| self.var("NODE_NAME")),
			underlay_ip: self.var("WGMESH_NODE_IP").or_else(|| self.var("NODE_IP")),
		}
	}

	fn load_overlay(&self) -> Result<OverlayConfigLayer, ConfigError> {
		Ok(OverlayConfigLayer {
			cidr: self.var("WGMESH_OVERLAY_CIDR"),
			device: self.var("WGMESH_OVERLAY_DEVICE"),
			listen_port: self.parsed("WGMESH_OVERLAY_LISTEN_PORT")?,
			ip_annotation: self.var("WGMESH_OVERLAY_IP_ANNOTATION"),
			public_key_annotation: self.var("WGMESH_OVERLAY_PUBLIC_KEY_ANNOTATION"),
		})
	}

	fn load_paths(&self) -> PathsConfigLayer {
		PathsConfigLayer {
			config_file: self.var("WGMESH_PATHS_CONFIG_FILE").map(PathBuf::from),
			update_file: self.var("WGMESH_PATHS_UPDATE_FILE").map(PathBuf::from),
			private_key_file: self.var("WGMESH_PATHS_PRIVATE_KEY_FILE").map(PathBuf::from),
			public_key_file: self.var("WGMESH_PATHS_PUBLIC_KEY_FILE").map(PathBuf::from),
		}
	}

	fn load_sync(&self) -> Result<SyncConfigLayer, ConfigError> {
		Ok(SyncConfigLayer {
			interval_secs: self.parsed("WGMESH_SYNC_INTERVAL_SECS")?,
			requeue_after_secs: self.parsed("WGMESH_SYNC_REQUEUE_AFTER_SECS")?,
			max_concurrent_reconciles: self.parsed("WGMESH_SYNC_MAX_CONCURRENT_RECONCILES")?,
			request_timeout_secs: self.parsed("WGMESH_SYNC_REQUEST_TIMEOUT_SECS")?,
		})
	}

	fn load_logging(&self) -> Result<LoggingConfigLayer, ConfigError> {
		Ok(LoggingConfigLayer {
			level: self.var("WGMESH_LOGGING_LEVEL"),
			format: self.parsed::<LogFormat>("WGMESH_LOGGING_FORMAT")?,
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<AgentConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(AgentConfigLayer {
			node: Some(self.load_node()),
			overlay: Some(self.load_overlay()?),
			paths: Some(self.load_paths()),
			sync: Some(self.load_sync()?),
			logging: Some(self.load_logging()?),
		})
	}
}
