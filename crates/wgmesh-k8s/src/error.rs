// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type K8sResult<T> = Result<T, K8sError>;

#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("Node not found: {name}")]
	NodeNotFound { name: String },

	#[error("Operation timed out")]
	Timeout,

	#[error("K8s client configuration error: {message}")]
	Config { message: String },

	#[error("Node watch error: {message}")]
	Watch { message: String },
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}

impl From<tokio::time::error::Elapsed> for K8sError {
	fn from(_: tokio::time::error::Elapsed) -> Self {
		K8sError::Timeout
	}
}
