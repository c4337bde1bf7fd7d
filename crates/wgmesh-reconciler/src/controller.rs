// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fans node watch events out to [`NodeReconciler`] invocations.
//!
//! At most one invocation runs per node name. An event for a node that is
//! already being reconciled is folded into a single follow-up run, and a
//! failed run is scheduled again after `requeue_after`.

use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, error, info, warn};
use wgmesh_k8s::{K8sError, NodeEvent};

use crate::error::ReconcileError;
use crate::node_reconciler::{NodeReconciler, ReconcileAction};

type Outcome = (
	String,
	std::thread::Result<Result<ReconcileAction, ReconcileError>>,
);

pub struct Controller {
	reconciler: Arc<NodeReconciler>,
	max_concurrent: usize,
	requeue_after: Duration,
}

#[derive(Default)]
struct DispatchState {
	in_flight: HashSet<String>,
	follow_up: HashSet<String>,
	queue: VecDeque<String>,
	queued: HashSet<String>,
	delayed: HashMap<String, delay_queue::Key>,
}

impl Controller {
	pub fn new(reconciler: Arc<NodeReconciler>, max_concurrent: usize, requeue_after: Duration) -> Self {
		Self {
			reconciler,
			max_concurrent: max_concurrent.max(1),
			requeue_after,
		}
	}

	/// Drive reconciliation until `cancel` fires, or until `events` ends and
	/// all outstanding work has drained.
	pub async fn run(
		self,
		mut events: BoxStream<'static, Result<NodeEvent, K8sError>>,
		cancel: CancellationToken,
	) {
		let mut state = DispatchState::default();
		let mut workers: JoinSet<Outcome> = JoinSet::new();
		let mut requeue: DelayQueue<String> = DelayQueue::new();
		let mut watch_open = true;

		info!(
			max_concurrent = self.max_concurrent,
			requeue_after_secs = self.requeue_after.as_secs(),
			"node controller started"
		);

		loop {
			while workers.len() < self.max_concurrent {
				let Some(name) = state.queue.pop_front() else {
					break;
				};
				state.queued.remove(&name);
				state.in_flight.insert(name.clone());
				let reconciler = Arc::clone(&self.reconciler);
				workers.spawn(async move {
					let result = AssertUnwindSafe(reconciler.reconcile(&name))
						.catch_unwind()
						.await;
					(name, result)
				});
			}

			if !watch_open && workers.is_empty() && state.queue.is_empty() {
				info!("node watch closed and work drained, controller stopping");
				break;
			}

			tokio::select! {
				biased;

				_ = cancel.cancelled() => {
					info!(in_flight = workers.len(), "node controller cancelled");
					break;
				}

				Some(joined) = workers.join_next(), if !workers.is_empty() => {
					match joined {
						Ok((name, outcome)) => {
							state.in_flight.remove(&name);
							if self.should_requeue(&name, outcome) {
								state.schedule(&mut requeue, name.clone(), self.requeue_after);
							}
							if state.follow_up.remove(&name) {
								state.enqueue(&mut requeue, name);
							}
						}
						Err(e) => error!(error = %e, "reconcile task aborted"),
					}
				}

				Some(expired) = requeue.next(), if !requeue.is_empty() => {
					let name = expired.into_inner();
					state.delayed.remove(&name);
					debug!(node = %name, "requeue due");
					state.enqueue(&mut requeue, name);
				}

				event = events.next(), if watch_open => match event {
					Some(Ok(NodeEvent::Resynced)) => debug!("node watch resynced"),
					Some(Ok(event)) => {
						if let Some(name) = event.node_name() {
							state.enqueue(&mut requeue, name.to_string());
						}
					}
					Some(Err(e)) => warn!(error = %e, "node watch error"),
					None => {
						info!("node watch stream ended");
						watch_open = false;
					}
				},
			}
		}

		workers.shutdown().await;
	}

	fn should_requeue(
		&self,
		name: &str,
		outcome: std::thread::Result<Result<ReconcileAction, ReconcileError>>,
	) -> bool {
		match outcome {
			Ok(Ok(action)) => {
				debug!(node = %name, ?action, "reconciled");
				false
			}
			Ok(Err(e)) => {
				e.report(name);
				e.is_retryable()
			}
			Err(_) => {
				error!(node = %name, "reconcile panicked");
				true
			}
		}
	}
}

impl DispatchState {
	fn enqueue(&mut self, requeue: &mut DelayQueue<String>, name: String) {
		if self.in_flight.contains(&name) {
			self.follow_up.insert(name);
			return;
		}
		if let Some(key) = self.delayed.remove(&name) {
			requeue.remove(&key);
		}
		if self.queued.insert(name.clone()) {
			self.queue.push_back(name);
		}
	}

	fn schedule(&mut self, requeue: &mut DelayQueue<String>, name: String, after: Duration) {
		if self.delayed.contains_key(&name) {
			return;
		}
		let key = requeue.insert(name.clone(), after);
		self.delayed.insert(name, key);
	}
}
