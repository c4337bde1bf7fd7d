// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! wgmesh node agent binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wgmesh_common::load_host_keypair;
use wgmesh_config::{AgentConfig, LogFormat};
use wgmesh_device::WgCommand;
use wgmesh_k8s::{KubeNodeClient, NodeClient};
use wgmesh_reconciler::{
	Controller, DeviceSynchronizer, FileSynchronizer, IntervalSyncer, LocalNode, NodeReconciler,
	PeerCache,
};

mod version;

/// Keeps this host's WireGuard peers in step with the cluster's nodes.
#[derive(Parser, Debug)]
#[command(name = "wgmesh-node-agent", about = "WireGuard overlay mesh node agent", version)]
struct Args {
	/// Config file (defaults to /etc/wgmesh/agent.toml)
	#[arg(long, global = true, env = "WGMESH_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Reconcile the live device on every node watch event
	Watch,
	/// Converge the wg-quick file on a fixed interval
	Sync {
		/// Run a single tick and exit
		#[arg(long)]
		once: bool,
	},
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	let config = match &args.config {
		Some(path) => wgmesh_config::load_config_with_file(path),
		None => wgmesh_config::load_config(),
	}
	.context("failed to load configuration")?;

	init_tracing(&config);

	tracing::info!(
		node = %config.node.name,
		device = %config.overlay.device,
		overlay_cidr = %config.overlay.cidr,
		version = version::VERSION,
		"starting wgmesh-node-agent"
	);

	let local = local_node(&config).await?;
	let client: Arc<KubeNodeClient> = Arc::new(
		KubeNodeClient::new(config.sync.request_timeout())
			.await
			.context("failed to create cluster client")?,
	);
	let cancel = shutdown_token();

	match args.command {
		Command::Watch => {
			let device = Arc::new(WgCommand::new(config.sync.request_timeout()));
			let reconciler = NodeReconciler::new(
				client.clone(),
				DeviceSynchronizer::new(device, config.overlay.device.clone()),
				Arc::new(PeerCache::new()),
				config.overlay.codec(),
				local,
			);
			Controller::new(
				Arc::new(reconciler),
				config.sync.max_concurrent_reconciles,
				config.sync.requeue_after(),
			)
			.run(client.watch_nodes(), cancel)
			.await;
		}
		Command::Sync { once } => {
			let syncer = IntervalSyncer::new(
				client,
				FileSynchronizer::new(
					config.paths.config_file.clone(),
					config.paths.update_file.clone(),
				),
				Arc::new(PeerCache::new()),
				config.overlay.codec(),
				local,
				config.sync.interval(),
			);
			if once {
				let report = syncer.run_once().await.context("sync tick failed")?;
				tracing::info!(
					peers = report.peers,
					rewritten = report.converge.rewritten,
					"sync tick complete"
				);
			} else {
				syncer.run(cancel).await;
			}
		}
		// Printed before configuration is loaded.
		Command::Version => {}
	}

	tracing::info!("wgmesh-node-agent stopped");
	Ok(())
}

fn init_tracing(config: &AgentConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());

	match config.logging.format {
		LogFormat::Json => tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer().json())
			.init(),
		LogFormat::Text => tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer())
			.init(),
	}
}

async fn local_node(config: &AgentConfig) -> Result<LocalNode> {
	let keypair = load_host_keypair(
		&config.paths.private_key_file,
		config.paths.public_key_file.as_deref(),
	)
	.await
	.with_context(|| {
		format!(
			"failed to load host key from {}",
			config.paths.private_key_file.display()
		)
	})?;

	tracing::info!(public_key = ?keypair.public_key(), "loaded host key");

	Ok(LocalNode::new(
		config.node.name.clone(),
		keypair,
		config.overlay.cidr.clone(),
		config.overlay.listen_port,
	)
	.with_underlay_ip(config.node.underlay_ip))
}

/// Cancelled on Ctrl-C, or SIGTERM on unix.
fn shutdown_token() -> CancellationToken {
	let token = CancellationToken::new();
	let trigger = token.clone();
	tokio::spawn(async move {
		wait_for_signal().await;
		tracing::info!("received shutdown signal");
		trigger.cancel();
	});
	token
}

#[cfg(unix)]
async fn wait_for_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	match signal(SignalKind::terminate()) {
		Ok(mut term) => {
			tokio::select! {
				_ = tokio::signal::ctrl_c() => {}
				_ = term.recv() => {}
			}
		}
		Err(e) => {
			tracing::warn!(error = %e, "cannot listen for SIGTERM, only Ctrl-C will stop the agent");
			let _ = tokio::signal::ctrl_c().await;
		}
	}
}

#[cfg(not(unix))]
async fn wait_for_signal() {
	let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_is_well_formed() {
		Args::command().debug_assert();
	}

	#[test]
	fn parses_sync_once_with_config() {
		let args = Args::try_parse_from(["wgmesh-node-agent", "--config", "/tmp/agent.toml", "sync", "--once"])
			.unwrap();
		assert_eq!(args.config, Some(PathBuf::from("/tmp/agent.toml")));
		assert!(matches!(args.command, Command::Sync { once: true }));
	}

	#[test]
	fn subcommand_is_required() {
		assert!(Args::try_parse_from(["wgmesh-node-agent"]).is_err());
	}
}
