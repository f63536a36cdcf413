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

//! Pure mapping from an `RCPT TO` reply code to a verdict, per spec.md
//! §4.7. `bounce_reason` always passes through verbatim and is applied by
//! the caller; this module only classifies the code.

use crate::util::input_output::Status;

/// The pure code-to-verdict mapping of spec.md §4.7, as the closed sum
/// type spec.md §9 mandates ("never a string-typed status in internal
/// code"). `Greylisted` is its own variant, distinct from `Unknown`, so
/// callers (the retry scheduler) can tell "greylisted, will retry" apart
/// from "genuinely inconclusive, terminal".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
	Valid,
	Invalid,
	Greylisted,
	CatchAll,
	Unknown,
}

pub fn classify_full(code: u16) -> Classification {
	match code {
		250 => Classification::Valid,
		251 | 252 => Classification::CatchAll,
		421 | 450 | 451 => Classification::Greylisted,
		550 | 551 | 553 => Classification::Invalid,
		_ => Classification::Unknown,
	}
}

impl Classification {
	pub fn retryable(self) -> bool {
		matches!(self, Classification::Greylisted)
	}

	pub fn status(self) -> Status {
		match self {
			Classification::Valid => Status::Valid,
			Classification::Invalid => Status::Invalid,
			Classification::Greylisted => Status::Unknown,
			Classification::CatchAll => Status::CatchAll,
			Classification::Unknown => Status::Unknown,
		}
	}
}
