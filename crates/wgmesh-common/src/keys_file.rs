// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::keys::{KeyError, WgKeyPair, WgPrivateKey, WgPublicKey};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug)]
pub enum KeyFileError {
	#[error("failed to read key file {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid key in {path}: {source}")]
	InvalidFormat {
		path: PathBuf,
		#[source]
		source: KeyError,
	},
}

pub type Result<T> = std::result::Result<T, KeyFileError>;

async fn read_key(path: &Path) -> Result<String> {
	fs::read_to_string(path)
		.await
		.map_err(|source| KeyFileError::Read {
			path: path.to_path_buf(),
			source,
		})
}

/// Load the host key pair written by the device initializer.
///
/// The public key is derived from the private key. When `public_path` is set
/// the file's contents win; a mismatch with the derived key is logged because
/// it means peers will be told a key the device does not hold.
#[instrument(skip_all, fields(private = %private_path.as_ref().display()))]
pub async fn load_host_keypair(
	private_path: impl AsRef<Path>,
	public_path: Option<&Path>,
) -> Result<WgKeyPair> {
	let private_path = private_path.as_ref();
	let content = read_key(private_path).await?;
	let private =
		WgPrivateKey::from_base64(&content).map_err(|source| KeyFileError::InvalidFormat {
			path: private_path.to_path_buf(),
			source,
		})?;

	let Some(public_path) = public_path else {
		debug!("deriving public key from private key");
		return Ok(WgKeyPair::from_private_key(private));
	};

	let content = read_key(public_path).await?;
	let public =
		WgPublicKey::from_base64(&content).map_err(|source| KeyFileError::InvalidFormat {
			path: public_path.to_path_buf(),
			source,
		})?;

	if public != private.public_key() {
		warn!(
			public_key_file = %public_path.display(),
			"public key file does not match private key"
		);
	}

	Ok(WgKeyPair::with_public_key(private, public))
}
