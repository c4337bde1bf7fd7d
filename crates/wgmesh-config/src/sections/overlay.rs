// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Overlay network section.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use wgmesh_common::{
	AnnotationCodec, DEFAULT_LISTEN_PORT, DEFAULT_OVERLAY_CIDR, IP_ANNOTATION, PUBLIC_KEY_ANNOTATION,
};

use crate::error::ConfigError;

fn default_device() -> String {
	"wg0".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OverlayConfigLayer {
	pub cidr: Option<String>,
	pub device: Option<String>,
	pub listen_port: Option<u16>,
	pub ip_annotation: Option<String>,
	pub public_key_annotation: Option<String>,
}

impl OverlayConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.cidr.is_some() {
			self.cidr = other.cidr;
		}
		if other.device.is_some() {
			self.device = other.device;
		}
		if other.listen_port.is_some() {
			self.listen_port = other.listen_port;
		}
		if other.ip_annotation.is_some() {
			self.ip_annotation = other.ip_annotation;
		}
		if other.public_key_annotation.is_some() {
			self.public_key_annotation = other.public_key_annotation;
		}
	}

	pub fn finalize(self) -> Result<OverlayConfig, ConfigError> {
		let cidr = self
			.cidr
			.unwrap_or_else(|| DEFAULT_OVERLAY_CIDR.to_string());
		let net: IpNet = cidr.trim().parse().map_err(|e| ConfigError::InvalidValue {
			key: "overlay.cidr".to_string(),
			message: format!("'{cidr}': {e}"),
		})?;
		if !matches!(net, IpNet::V4(_)) {
			return Err(ConfigError::Validation(format!(
				"overlay.cidr {cidr} is IPv6; only IPv4 overlay blocks can derive addresses"
			)));
		}

		let listen_port = self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT);
		if listen_port == 0 {
			return Err(ConfigError::InvalidValue {
				key: "overlay.listen_port".to_string(),
				message: "must be non-zero".to_string(),
			});
		}

		Ok(OverlayConfig {
			cidr: net.to_string(),
			device: self.device.unwrap_or_else(default_device),
			listen_port,
			ip_annotation: self
				.ip_annotation
				.unwrap_or_else(|| IP_ANNOTATION.to_string()),
			public_key_annotation: self
				.public_key_annotation
				.unwrap_or_else(|| PUBLIC_KEY_ANNOTATION.to_string()),
		})
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverlayConfig {
	pub cidr: String,
	pub device: String,
	pub listen_port: u16,
	pub ip_annotation: String,
	pub public_key_annotation: String,
}

impl OverlayConfig {
	pub fn codec(&self) -> AnnotationCodec {
		AnnotationCodec::new(
			self.ip_annotation.clone(),
			self.public_key_annotation.clone(),
			self.listen_port,
		)
	}
}

impl Default for OverlayConfig {
	fn default() -> Self {
		Self {
			cidr: DEFAULT_OVERLAY_CIDR.to_string(),
			device: default_device(),
			listen_port: DEFAULT_LISTEN_PORT,
			ip_annotation: IP_ANNOTATION.to_string(),
			public_key_annotation: PUBLIC_KEY_ANNOTATION.to_string(),
		}
	}
}
