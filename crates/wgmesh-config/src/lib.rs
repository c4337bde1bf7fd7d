// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the mesh node agent.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`WGMESH_*`)
//!
//! # Usage
//!
//! ```ignore
//! use wgmesh_config::load_config;
//!
//! let config = load_config()?;
//! println!("reconciling {} on {}", config.overlay.device, config.node.name);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::AgentConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH,
};

use std::path::PathBuf;
use tracing::{debug, info};

/// Fully resolved agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
	pub node: NodeConfig,
	pub overlay: OverlayConfig,
	pub paths: PathsConfig,
	pub sync: SyncConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`WGMESH_*`)
/// 2. Config file (`/etc/wgmesh/agent.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<AgentConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource::default()),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<AgentConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource::default()),
	])
}

pub fn load_config_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<AgentConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = AgentConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: AgentConfigLayer) -> Result<AgentConfig, ConfigError> {
	let node = layer.node.unwrap_or_default().finalize()?;
	let overlay = layer.overlay.unwrap_or_default().finalize()?;
	let paths = layer.paths.unwrap_or_default().finalize();
	let sync = layer.sync.unwrap_or_default().finalize()?;
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&paths)?;

	info!(
		node = %node.name,
		device = %overlay.device,
		overlay_cidr = %overlay.cidr,
		config_file = %paths.config_file.display(),
		interval_secs = sync.interval_secs,
		"Agent configuration loaded"
	);

	Ok(AgentConfig {
		node,
		overlay,
		paths,
		sync,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(paths: &PathsConfig) -> Result<(), ConfigError> {
	if paths.config_file == paths.update_file {
		return Err(ConfigError::Validation(format!(
			"paths.config_file and paths.update_file are both {}",
			paths.config_file.display()
		)));
	}
	if paths.config_file.file_name().is_none() {
		return Err(ConfigError::Validation(format!(
			"paths.config_file {} does not name a file",
			paths.config_file.display()
		)));
	}
	Ok(())
}
