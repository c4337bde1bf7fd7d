// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Overlay reconciliation engine.
//!
//! Two control loops share the same building blocks:
//!
//! - [`Controller`] reacts to node watch events, one [`NodeReconciler`]
//!   invocation per node, and pushes peers straight into the live device.
//! - [`IntervalSyncer`] polls the full node list on a fixed period and
//!   converges the wg-quick file, leaving device restarts to a supervisor.

pub mod cache;
pub mod controller;
pub mod device_sync;
pub mod error;
pub mod file_sync;
pub mod interval;
pub mod local;
pub mod node_reconciler;

pub use cache::{PeerCache, PeerDiff};
pub use controller::Controller;
pub use device_sync::DeviceSynchronizer;
pub use error::{ReconcileError, Result};
pub use file_sync::{needs_restart, ConvergeOutcome, FileSynchronizer, RestartReason, RESTART_SENTINEL};
pub use interval::{IntervalSyncer, TickReport};
pub use local::LocalNode;
pub use node_reconciler::{NodeReconciler, ReconcileAction};
