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

//! Terminal-outcome writeback, per spec.md §6: a single parameterised
//! update keyed by `(job_id, email)` setting `status`, `smtp_code`,
//! `bounce_reason`. Database errors are logged and never retried by the
//! core (spec.md §7): the row simply stays at `PENDING`.

use check_if_email_exists::{ValidationOutcome, WorkItem};
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
	#[error("database update failed: {0}")]
	Query(#[from] sqlx::Error),
}

/// Construct the shared connection pool once at startup, matching
/// spec.md §9's "Services aggregate constructed once at bootstrap and
/// passed by reference".
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
	PgPool::connect(database_url).await
}

/// Write the terminal verdict for `item`. Never called for a retryable
/// (greylisted) outcome; the caller is responsible for routing those to
/// the Retry Scheduler instead, leaving the row at `PENDING`.
pub async fn write_outcome(
	pool: &PgPool,
	item: &WorkItem,
	outcome: &ValidationOutcome,
) -> Result<(), DbError> {
	sqlx::query(
		"UPDATE email_validations \
         SET status = $1, smtp_code = $2, bounce_reason = $3 \
         WHERE job_id = $4 AND email = $5",
	)
	.bind(outcome.status.as_db_str())
	.bind(outcome.smtp_code as i32)
	.bind(&outcome.bounce_reason)
	.bind(&item.job_id)
	.bind(&item.email)
	.execute(pool)
	.await?;

	Ok(())
}
