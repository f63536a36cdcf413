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

use serde::{Deserialize, Serialize};

/// A work item as it travels through the main queue and the delayed-retry
/// set. Opaque and immutable across its lifetime: the same item may be
/// re-enqueued any number of times, by the retry scheduler or by an
/// upstream redelivery, without changing its identity.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkItem {
	/// Identifier of the job this address belongs to.
	pub job_id: String,
	/// The address to validate.
	pub email: String,
}

impl WorkItem {
	pub fn new(job_id: impl Into<String>, email: impl Into<String>) -> Self {
		WorkItem {
			job_id: job_id.into(),
			email: email.into(),
		}
	}
}

/// An enum to describe how confident we are that the recipient address is
/// deliverable. Deliberately a closed sum type, per the "never a
/// string-typed status in internal code" design note: string
/// serialization only happens at the database boundary (see
/// `Status::as_db_str`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Status {
	/// `RCPT TO` was accepted (250).
	Valid,
	/// `RCPT TO` was permanently rejected (550/551/553), or the address
	/// failed syntax/MX checks before any dialog was attempted.
	Invalid,
	/// The domain accepts mail for any local part; the probe established
	/// this without needing to contact the real address.
	CatchAll,
	/// No conclusive reply was obtained (dial/read/write failure, or an
	/// SMTP code we don't recognize).
	Unknown,
}

impl Status {
	/// The literal string persisted in the database's `status` column. Rows
	/// start at `PENDING` and this function is never called to produce that
	/// value: `PENDING` is the store's own default, not a `Status` variant,
	/// because a greylisted item is never terminal.
	pub fn as_db_str(self) -> &'static str {
		match self {
			Status::Valid => "VALID",
			Status::Invalid => "INVALID",
			Status::CatchAll => "CATCH_ALL",
			Status::Unknown => "UNKNOWN",
		}
	}
}

/// The terminal (or retryable) result of validating one [`WorkItem`].
///
/// `retryable` is only ever produced internally by the response classifier
/// for greylisting codes (421/450/451); it is consumed by the retry
/// scheduler and is never itself persisted to the database.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ValidationOutcome {
	pub status: Status,
	/// `0` signals "no reply obtained", i.e. a transport failure.
	pub smtp_code: u16,
	/// Server reply text, verbatim, trimmed. Empty when no reply was
	/// obtained.
	pub bounce_reason: String,
	pub retryable: bool,
}

impl ValidationOutcome {
	pub fn invalid(smtp_code: u16, reason: impl Into<String>) -> Self {
		ValidationOutcome {
			status: Status::Invalid,
			smtp_code,
			bounce_reason: reason.into(),
			retryable: false,
		}
	}

	pub fn unknown(reason: impl Into<String>) -> Self {
		ValidationOutcome {
			status: Status::Unknown,
			smtp_code: 0,
			bounce_reason: reason.into(),
			retryable: false,
		}
	}

	pub fn catch_all(reason: impl Into<String>) -> Self {
		ValidationOutcome {
			status: Status::CatchAll,
			smtp_code: 250,
			bounce_reason: reason.into(),
			retryable: false,
		}
	}
}
