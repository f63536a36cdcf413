// check-if-email-exists
// Copyright (C) 2018-2024 Reacher

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Fixed pool of `N = 50` worker tasks fed by a bounded channel of
//! capacity `2N`, per spec.md §4.9. The dispatcher loop owns the global
//! token and the blocking pop; each worker task owns one item's pipeline
//! run, start to finish.

use std::sync::Arc;

use check_if_email_exists::WorkItem;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::db;
use crate::pipeline::{self, PipelineContext, PipelineOutcome};
use crate::queue::Broker;
use crate::rate_limit::GlobalBucket;
use crate::retry;

/// Size of the fixed worker pool, per spec.md §4.9.
pub const POOL_SIZE: usize = 50;
/// Bounded channel capacity: `2 * POOL_SIZE`.
pub const CHANNEL_CAPACITY: usize = 2 * POOL_SIZE;

/// Spawns the dispatcher loop and the `N` worker tasks, returning once
/// `cancel` fires and every task has drained.
pub async fn run(
	broker: Broker,
	pool: PgPool,
	ctx: Arc<PipelineContext>,
	global: Arc<GlobalBucket>,
	cancel: CancellationToken,
) {
	let (tx, rx) = mpsc::channel::<WorkItem>(CHANNEL_CAPACITY);
	let rx = Arc::new(tokio::sync::Mutex::new(rx));

	let mut workers = Vec::with_capacity(POOL_SIZE);
	for worker_id in 0..POOL_SIZE {
		let rx = rx.clone();
		let pool = pool.clone();
		let broker = broker.clone();
		let ctx = ctx.clone();
		let cancel = cancel.clone();
		workers.push(tokio::spawn(async move {
			worker_loop(worker_id, rx, pool, broker, ctx, cancel).await;
		}));
	}

	dispatcher_loop(broker.clone(), global, tx, cancel.clone()).await;

	for worker in workers {
		let _ = worker.await;
	}
}

async fn dispatcher_loop(
	broker: Broker,
	global: Arc<GlobalBucket>,
	tx: mpsc::Sender<WorkItem>,
	cancel: CancellationToken,
) {
	loop {
		if cancel.is_cancelled() {
			tracing::info!(target: check_if_email_exists::LOG_TARGET, "dispatcher shutting down");
			return;
		}

		global.acquire().await;

		let item = tokio::select! {
			_ = cancel.cancelled() => return,
			result = broker.pop() => result,
		};

		let item = match item {
			Ok(Some(item)) => item,
			Ok(None) => continue, // receive timeout, loop and re-acquire
			Err(err) => {
				tracing::warn!(
					target: check_if_email_exists::LOG_TARGET,
					error = %err,
					"dispatcher: broker pop failed, backing off"
				);
				tokio::time::sleep(std::time::Duration::from_secs(1)).await;
				continue;
			}
		};

		match tx.try_send(item) {
			Ok(()) => {}
			Err(mpsc::error::TrySendError::Full(item)) => {
				tracing::warn!(
					target: check_if_email_exists::LOG_TARGET,
					job_id = %item.job_id,
					email = %item.email,
					"dispatcher: worker channel full, dropping item"
				);
			}
			Err(mpsc::error::TrySendError::Closed(_)) => return,
		}
	}
}

async fn worker_loop(
	worker_id: usize,
	rx: Arc<tokio::sync::Mutex<mpsc::Receiver<WorkItem>>>,
	pool: PgPool,
	broker: Broker,
	ctx: Arc<PipelineContext>,
	cancel: CancellationToken,
) {
	loop {
		let item = {
			let mut rx = rx.lock().await;
			tokio::select! {
				_ = cancel.cancelled() => None,
				item = rx.recv() => item,
			}
		};
		let Some(item) = item else {
			tracing::debug!(target: check_if_email_exists::LOG_TARGET, worker_id, "worker exiting");
			return;
		};

		let span = tracing::info_span!(
			"validate",
			job_id = %item.job_id,
			email = %item.email,
			worker_id
		);

		async {
			match pipeline::run(&item, &ctx).await {
				PipelineOutcome::Terminal(outcome) => {
					tracing::info!(
						target: check_if_email_exists::LOG_TARGET,
						status = ?outcome.status,
						smtp_code = outcome.smtp_code,
						"validation complete"
					);
					if let Err(err) = db::write_outcome(&pool, &item, &outcome).await {
						tracing::warn!(
							target: check_if_email_exists::LOG_TARGET,
							error = %err,
							"database writeback failed, row stays PENDING"
						);
					}
				}
				PipelineOutcome::Retry => {
					let now = std::time::SystemTime::now()
						.duration_since(std::time::UNIX_EPOCH)
						.expect("system clock is after the epoch")
						.as_secs() as i64;
					if let Err(err) = retry::schedule(&broker, &item, now).await {
						tracing::error!(
							target: check_if_email_exists::LOG_TARGET,
							error = %err,
							"failed to schedule retry, item may be lost"
						);
					}
				}
			}
		}
		.instrument(span)
		.await;
	}
}
