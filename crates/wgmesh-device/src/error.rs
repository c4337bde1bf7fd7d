// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Error, Debug)]
pub enum DeviceError {
	#[error("failed to run {command}: {source}")]
	Spawn {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{command} exited with {status}: {stderr}")]
	Failed {
		command: String,
		status: String,
		stderr: String,
	},

	#[error("{command} timed out")]
	Timeout { command: String },

	#[error("unexpected device listing: {0}")]
	Parse(String),

	#[error("device error: {0}")]
	Other(String),
}
