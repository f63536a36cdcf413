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

//! Delays greylisted work items and promotes them back to the main queue
//! once due, per spec.md §4.8. `now()` is taken as a parameter everywhere
//! it matters so that the due-time check in spec.md §8 scenario 3 is
//! deterministic in tests (spec.md §9 "Time as an input").

use std::time::Duration;

use check_if_email_exists::WorkItem;
use tokio_util::sync::CancellationToken;

use crate::queue::{Broker, QueueError};

/// Delay applied to a greylisted outcome before it becomes eligible again.
pub const RETRY_DELAY_SECS: i64 = 900;

/// How often the monitor wakes up to sweep the delayed set.
pub const MONITOR_TICK: Duration = Duration::from_secs(30);

/// Insert `item` into the delayed-retry set, scored `now + 900`, per
/// spec.md §4.8. The caller (the per-task pipeline) must not write a row
/// for this outcome: the store stays at `PENDING`.
pub async fn schedule(broker: &Broker, item: &WorkItem, now: i64) -> Result<(), QueueError> {
	broker.schedule_retry(item, now + RETRY_DELAY_SECS).await
}

/// One sweep of the delayed set: promote everything due at or before `now`
/// back to the head of the main queue. Malformed entries are dropped; a
/// failed promotion push is re-inserted with a fresh delay rather than
/// lost, per spec.md §4.8 and §7.
pub async fn run_tick(broker: &Broker, now: i64) {
	let due = match broker.due_retries(now).await {
		Ok(due) => due,
		Err(err) => {
			tracing::warn!(
				target: check_if_email_exists::LOG_TARGET,
				error = %err,
				"retry monitor: failed to query due items this tick"
			);
			return;
		}
	};

	for payload in due {
		match broker.remove_retry(&payload).await {
			Ok(0) => continue, // another tick (or process) already claimed it
			Ok(_) => {}
			Err(err) => {
				tracing::warn!(
					target: check_if_email_exists::LOG_TARGET,
					error = %err,
					"retry monitor: failed to remove a due item, will retry next tick"
				);
				continue;
			}
		}

		let item: WorkItem = match serde_json::from_str(&payload) {
			Ok(item) => item,
			Err(err) => {
				tracing::warn!(
					target: check_if_email_exists::LOG_TARGET,
					error = %err,
					payload = %payload,
					"retry monitor: dropping malformed retry-set entry"
				);
				continue;
			}
		};

		if let Err(err) = broker.push_front(&item).await {
			tracing::warn!(
				target: check_if_email_exists::LOG_TARGET,
				job_id = %item.job_id,
				email = %item.email,
				error = %err,
				"retry monitor: failed to promote due item, re-inserting with a fresh delay"
			);
			if let Err(err) = broker.schedule_retry(&item, now + RETRY_DELAY_SECS).await {
				tracing::error!(
					target: check_if_email_exists::LOG_TARGET,
					job_id = %item.job_id,
					email = %item.email,
					error = %err,
					"retry monitor: failed to re-insert after a failed promotion; item may be lost"
				);
			}
		}
	}
}

/// Runs [`run_tick`] on a 30s ticker until `cancel` fires.
pub async fn monitor_loop(broker: Broker, cancel: CancellationToken, now: impl Fn() -> i64) {
	let mut interval = tokio::time::interval(MONITOR_TICK);
	loop {
		tokio::select! {
			_ = cancel.cancelled() => {
				tracing::info!(target: check_if_email_exists::LOG_TARGET, "retry monitor shutting down");
				return;
			}
			_ = interval.tick() => {
				run_tick(&broker, now()).await;
			}
		}
	}
}
