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

//! Client for the two broker primitives from spec.md §6: `email_queue`
//! (a list, `LPUSH`/`BRPOP`) and `email_retry_queue` (a sorted set, scored
//! by Unix seconds).

use check_if_email_exists::WorkItem;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

pub const MAIN_QUEUE_KEY: &str = "email_queue";
pub const RETRY_QUEUE_KEY: &str = "email_retry_queue";

/// Consumer's receive-timeout on the blocking pop, per spec.md §4.9 step 2.
pub const POP_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum QueueError {
	#[error("broker error: {0}")]
	Broker(#[from] redis::RedisError),
	#[error("malformed work item: {0}")]
	Malformed(String),
}

/// Thin wrapper around a shared, thread-safe Redis connection, per spec.md
/// §5's "the Redis/queue clients are thread-safe and shared".
#[derive(Clone)]
pub struct Broker {
	conn: ConnectionManager,
}

impl Broker {
	pub fn new(conn: ConnectionManager) -> Self {
		Broker { conn }
	}

	/// Blocking pop from the tail of the main queue, capped at
	/// [`POP_TIMEOUT_SECS`]; returns `Ok(None)` on timeout so the caller can
	/// loop, per spec.md §4.9 step 2.
	pub async fn pop(&self) -> Result<Option<WorkItem>, QueueError> {
		let mut conn = self.conn.clone();
		let reply: Option<(String, String)> = conn
			.brpop(MAIN_QUEUE_KEY, POP_TIMEOUT_SECS as f64)
			.await?;

		let Some((_key, payload)) = reply else {
			return Ok(None);
		};

		let item = serde_json::from_str(&payload)
			.map_err(|e| QueueError::Malformed(e.to_string()))?;
		Ok(Some(item))
	}

	/// Push `item` onto the head of the main queue, per spec.md §6
	/// ("producer pushes to head"), used both by the retry monitor when
	/// promoting a due item and by redelivery paths.
	pub async fn push_front(&self, item: &WorkItem) -> Result<(), QueueError> {
		let mut conn = self.conn.clone();
		let payload = serde_json::to_string(item).expect("WorkItem is always serializable");
		conn.lpush(MAIN_QUEUE_KEY, payload).await?;
		Ok(())
	}

	/// Insert `item` into the delayed-retry set with score `due_at` (Unix
	/// seconds), per spec.md §4.8.
	pub async fn schedule_retry(&self, item: &WorkItem, due_at: i64) -> Result<(), QueueError> {
		let mut conn = self.conn.clone();
		let payload = serde_json::to_string(item).expect("WorkItem is always serializable");
		conn.zadd(RETRY_QUEUE_KEY, payload, due_at).await?;
		Ok(())
	}

	/// All retry-set members scored at or below `now`, along with their raw
	/// (possibly malformed) payload, for the Retry Monitor's tick.
	pub async fn due_retries(&self, now: i64) -> Result<Vec<String>, QueueError> {
		let mut conn = self.conn.clone();
		let members: Vec<String> = conn
			.zrangebyscore(RETRY_QUEUE_KEY, i64::MIN, now)
			.await?;
		Ok(members)
	}

	/// Atomically remove `payload` from the retry set. Returns the number
	/// of members removed (0 if another monitor tick already claimed it).
	pub async fn remove_retry(&self, payload: &str) -> Result<i64, QueueError> {
		let mut conn = self.conn.clone();
		let removed: i64 = conn.zrem(RETRY_QUEUE_KEY, payload).await?;
		Ok(removed)
	}
}
