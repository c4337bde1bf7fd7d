// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod logging;
mod node;
mod overlay;
mod paths;
mod sync;

pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use node::{NodeConfig, NodeConfigLayer};
pub use overlay::{OverlayConfig, OverlayConfigLayer};
pub use paths::{PathsConfig, PathsConfigLayer};
pub use sync::{SyncConfig, SyncConfigLayer};
