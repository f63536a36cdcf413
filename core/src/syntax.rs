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

//! Stateless lexical validation of an email address, per a pragmatic subset
//! of RFC 5322. This never touches the network: a syntax rejection
//! short-circuits the rest of the pipeline.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Local part: printable ASCII allowed by RFC 5322's `atext`, plus `.` as a
/// separator (handled separately below, since the regex alone can't express
/// "no leading/trailing/doubled dot").
static LOCAL_PART_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+$").expect("valid regex"));

/// A single domain label: letters, digits, hyphen, no hyphen at either edge.
static LABEL_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$").expect("valid regex"));

/// The result of a lexical syntax check, kept alongside the terminal
/// [`crate::util::input_output::ValidationOutcome`] only for tracing: the
/// pipeline only ever cares about `is_valid`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SyntaxCheck {
	pub is_valid: bool,
	pub username: String,
	pub domain: String,
}

/// Validate `email` against the constraints in spec.md §4.1: total length
/// 3..254, exactly one `@`, local part 1..64 with no leading/trailing/double
/// dot, domain part 1..253 with no leading/trailing/double dot, at least one
/// dot in the domain, TLD label of at least 2 characters, and a pragmatic
/// RFC-5322 character class in both parts.
pub fn validate(email: &str) -> SyntaxCheck {
	match validate_inner(email) {
		Some((username, domain)) => SyntaxCheck {
			is_valid: true,
			username,
			domain,
		},
		None => SyntaxCheck {
			is_valid: false,
			username: String::new(),
			domain: extract_domain_best_effort(email),
		},
	}
}

fn validate_inner(email: &str) -> Option<(String, String)> {
	if email.len() < 3 || email.len() > 254 {
		return None;
	}

	// Exactly one '@'.
	let mut parts = email.splitn(2, '@');
	let local = parts.next()?;
	let domain = parts.next()?;
	if domain.contains('@') {
		return None;
	}

	if !is_valid_local_part(local) || !is_valid_domain(domain) {
		return None;
	}

	Some((local.to_lowercase(), domain.to_lowercase()))
}

fn is_valid_local_part(local: &str) -> bool {
	if local.is_empty() || local.len() > 64 {
		return false;
	}
	if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
		return false;
	}
	LOCAL_PART_RE.is_match(local)
}

fn is_valid_domain(domain: &str) -> bool {
	if domain.is_empty() || domain.len() > 253 {
		return false;
	}
	if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
		return false;
	}
	if !domain.contains('.') {
		return false;
	}

	let labels: Vec<&str> = domain.split('.').collect();
	let Some(tld) = labels.last() else {
		return false;
	};
	if tld.len() < 2 {
		return false;
	}

	labels.iter().all(|label| LABEL_RE.is_match(label))
}

fn extract_domain_best_effort(email: &str) -> String {
	email
		.rsplit_once('@')
		.map(|(_, domain)| domain.to_lowercase())
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_a_plain_address() {
		let check = validate("good@example.com");
		assert!(check.is_valid);
		assert_eq!(check.username, "good");
		assert_eq!(check.domain, "example.com");
	}

	#[test]
	fn rejects_double_at() {
		assert!(!validate("user@@bad.com").is_valid);
	}

	#[test]
	fn rejects_double_dot_in_local_part() {
		assert!(!validate("us..er@example.com").is_valid);
	}

	#[test]
	fn accepts_single_dot_in_local_part() {
		assert!(validate("us.er@example.com").is_valid);
	}

	#[test]
	fn rejects_domain_without_dot() {
		assert!(!validate("user@localhost").is_valid);
	}

	#[test]
	fn accepts_address_at_exactly_254_chars() {
		// 254 = 1 ("@") + local (64, max) + domain (189).
		let local = "a".repeat(64);
		let domain = format!("{}.com", "b".repeat(185));
		let email = format!("{}@{}", local, domain);
		assert_eq!(email.len(), 254);
		assert!(validate(&email).is_valid);
	}

	#[test]
	fn rejects_address_at_255_chars() {
		let local = "a".repeat(64);
		let domain = format!("{}.com", "b".repeat(186));
		let email = format!("{}@{}", local, domain);
		assert_eq!(email.len(), 255);
		assert!(!validate(&email).is_valid);
	}

	#[test]
	fn rejects_tld_shorter_than_two_chars() {
		assert!(!validate("user@example.c").is_valid);
	}

	#[test]
	fn rejects_label_with_leading_hyphen() {
		assert!(!validate("user@-example.com").is_valid);
	}
}
