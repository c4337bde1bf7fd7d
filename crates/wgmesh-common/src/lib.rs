// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod annotations;
pub mod ip;
pub mod keys;
pub mod keys_file;
pub mod peer;
pub mod wgconf;

pub use annotations::{
	AnnotationCodec, ClusterNodeRecord, CodecError, NodeAddress, INTERNAL_IP, IP_ANNOTATION,
	PUBLIC_KEY_ANNOTATION,
};
pub use ip::{derive_overlay_ip, host_route, DEFAULT_OVERLAY_CIDR};
pub use keys::{KeyError, WgKeyPair, WgPrivateKey, WgPublicKey};
pub use keys_file::{load_host_keypair, KeyFileError};
pub use peer::{HostInterface, Peer, PeerError, DEFAULT_LISTEN_PORT};
pub use wgconf::WireguardTextConfig;
