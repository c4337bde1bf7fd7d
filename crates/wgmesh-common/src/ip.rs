// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::{IpNet, Ipv4Net};
use std::net::{IpAddr, Ipv4Addr};

pub const DEFAULT_OVERLAY_CIDR: &str = "100.64.0.0/16";

/// Map an underlay host address into the overlay block.
///
/// The two high octets come from the overlay block and the two low octets
/// from the host, so hosts that differ in their low 16 bits get distinct
/// overlay addresses. Returns `None` for an unparseable block or address and
/// for anything IPv6: there is no IPv6 derivation.
pub fn derive_overlay_ip(underlay: &str, overlay_cidr: &str) -> Option<Ipv4Addr> {
	let block: Ipv4Net = overlay_cidr.trim().parse().ok()?;
	let host: Ipv4Addr = match underlay.trim().parse::<IpAddr>().ok()? {
		IpAddr::V4(v4) => v4,
		IpAddr::V6(_) => return None,
	};

	let prefix = block.network().octets();
	let low = host.octets();
	Some(Ipv4Addr::new(prefix[0], prefix[1], low[2], low[3]))
}

/// The single-address route for `addr` (/32 or /128).
pub fn host_route(addr: IpAddr) -> IpNet {
	IpNet::from(addr)
}
