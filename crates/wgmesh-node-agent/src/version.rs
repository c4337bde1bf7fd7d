// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn platform() -> String {
	format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Format version info for display.
pub fn format_version_info() -> String {
	format!(
		"wgmesh-node-agent version: {}\n\
         Platform:                  {}",
		VERSION,
		platform(),
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn version_info_names_binary_and_platform() {
		let info = format_version_info();
		assert!(info.starts_with("wgmesh-node-agent version: "));
		assert!(info.contains(&platform()));
	}
}
