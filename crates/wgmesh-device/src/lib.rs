// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Control of the local WireGuard device.
//!
//! The device link is created by a separate initializer; this crate only
//! lists and reconfigures it.

mod control;
mod error;
mod mock;
mod wg_command;

pub use control::{DeviceControl, DeviceSnapshot, DeviceUpdate, PeerOperation};
pub use error::{DeviceError, DeviceResult};
pub use mock::MockDevice;
pub use wg_command::{parse_dump, set_args, WgCommand};
