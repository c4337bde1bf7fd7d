// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster node access for the WireGuard mesh.
//!
//! This crate provides:
//! - A trait-based node client abstraction for testability
//! - Production implementation using the kube crate
//! - An in-memory mock for tests

mod client;
mod error;
mod kube_client;
mod mock;

pub use client::{NodeClient, NodeEvent};
pub use error::{K8sError, K8sResult};
pub use kube_client::{node_record, KubeNodeClient};
pub use mock::MockNodeClient;
