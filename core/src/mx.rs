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

//! DNS MX lookup. Resolves a domain to the mail exchanger we should dial,
//! or collapses any failure into the `{Invalid, 550, "<cause>"}` shape
//! spec.md §4.2 mandates.

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use thiserror::Error;

/// The destination a [`crate::proxy`] dial should target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
	pub host: String,
	pub port: u16,
}

/// Resolution failures collapse to `Invalid` with an explanatory reason,
/// per spec.md §4.2: resolver error, empty record set, or a blank host
/// after trimming.
#[derive(Debug, Error)]
pub enum MxError {
	#[error("MX lookup failed: {0}")]
	ResolverError(String),
	#[error("MX lookup returned no records")]
	NoRecords,
	#[error("MX record host is blank")]
	BlankHost,
}

/// Abstraction over "look up the MX records for a domain", so tests can
/// supply a fake resolver and keep scenario 6 of spec.md §8 deterministic.
#[async_trait]
pub trait Resolve: Send + Sync {
	async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, String>;
}

/// Production resolver backed by `hickory-resolver`, reading the system's
/// configured nameservers.
pub struct SystemResolver {
	inner: TokioAsyncResolver,
}

impl SystemResolver {
	pub fn from_system_conf() -> Result<Self, MxError> {
		let inner = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
		Ok(SystemResolver { inner })
	}
}

#[async_trait]
impl Resolve for SystemResolver {
	async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, String> {
		let lookup = self
			.inner
			.mx_lookup(domain)
			.await
			.map_err(|e| e.to_string())?;

		// Sort by preference (lowest first) and strip the trailing dot.
		let mut records: Vec<(u16, String)> = lookup
			.iter()
			.map(|mx| (mx.preference(), mx.exchange().to_string()))
			.collect();
		records.sort_by_key(|(preference, _)| *preference);

		Ok(records
			.into_iter()
			.map(|(_, host)| host.trim_end_matches('.').to_string())
			.collect())
	}
}

/// Resolve `domain` to the mail exchanger to dial. In development mode the
/// lookup is bypassed entirely and the destination is hard-coded to the
/// local sink `(localhost, 1025)`, per spec.md §4.2.
pub async fn resolve_target(
	domain: &str,
	is_dev: bool,
	resolver: &dyn Resolve,
) -> Result<Target, MxError> {
	if is_dev {
		tracing::debug!(
			target: crate::LOG_TARGET,
			domain,
			"development mode, bypassing MX lookup for local sink"
		);
		return Ok(Target {
			host: "localhost".to_string(),
			port: 1025,
		});
	}

	let records = resolver
		.lookup_mx(domain)
		.await
		.map_err(MxError::ResolverError)?;

	let host = records.into_iter().next().ok_or(MxError::NoRecords)?;
	let host = host.trim().to_string();
	if host.is_empty() {
		return Err(MxError::BlankHost);
	}

	tracing::debug!(target: crate::LOG_TARGET, domain, mx_host = %host, "resolved MX host");
	Ok(Target { host, port: 25 })
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FakeResolver {
		records: Result<Vec<String>, String>,
	}

	#[async_trait]
	impl Resolve for FakeResolver {
		async fn lookup_mx(&self, _domain: &str) -> Result<Vec<String>, String> {
			self.records.clone()
		}
	}

	#[tokio::test]
	async fn dev_mode_bypasses_resolver_entirely() {
		let resolver = FakeResolver {
			records: Err("should never be called".to_string()),
		};
		let target = resolve_target("example.com", true, &resolver).await.unwrap();
		assert_eq!(target.host, "localhost");
		assert_eq!(target.port, 1025);
	}

	#[tokio::test]
	async fn picks_lowest_preference_host_and_strips_trailing_dot() {
		let resolver = FakeResolver {
			records: Ok(vec!["mx1.example.com".to_string()]),
		};
		let target = resolve_target("example.com", false, &resolver)
			.await
			.unwrap();
		assert_eq!(target.host, "mx1.example.com");
		assert_eq!(target.port, 25);
	}

	#[tokio::test]
	async fn empty_record_set_is_invalid() {
		let resolver = FakeResolver { records: Ok(vec![]) };
		let err = resolve_target("example.com", false, &resolver)
			.await
			.unwrap_err();
		assert!(matches!(err, MxError::NoRecords));
	}

	#[tokio::test]
	async fn resolver_error_is_invalid() {
		let resolver = FakeResolver {
			records: Err("timed out".to_string()),
		};
		let err = resolve_target("dead-domain.invalid", false, &resolver)
			.await
			.unwrap_err();
		assert!(matches!(err, MxError::ResolverError(_)));
	}
}
