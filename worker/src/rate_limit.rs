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

//! Two-layer token bucket: one process-global bucket guarding the
//! Dispatcher's dequeue loop, and a per-domain bucket map guarding the
//! dial, per spec.md §4.6.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::sync::RwLock;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn quota(rate: NonZeroU32, burst: NonZeroU32) -> Quota {
	Quota::per_second(rate).allow_burst(burst)
}

/// The process-global bucket: `R_global = 2` tok/s, burst 2. Acquired by
/// the Dispatcher before every blocking pop, per spec.md §4.6.
pub struct GlobalBucket {
	limiter: DirectLimiter,
}

impl GlobalBucket {
	pub fn new() -> Self {
		GlobalBucket {
			limiter: RateLimiter::direct(quota(nonzero!(2u32), nonzero!(2u32))),
		}
	}

	/// Blocks (cooperatively) until a token is available.
	pub async fn acquire(&self) {
		self.limiter.until_ready().await;
	}
}

impl Default for GlobalBucket {
	fn default() -> Self {
		Self::new()
	}
}

/// `(rate, burst)` default for a domain absent from the explicit table in
/// spec.md §4.6.
fn default_quota() -> (NonZeroU32, NonZeroU32) {
	(nonzero!(5u32), nonzero!(5u32))
}

fn quota_for_domain(domain: &str) -> (NonZeroU32, NonZeroU32) {
	match domain {
		"gmail.com" | "googlemail.com" => (nonzero!(2u32), nonzero!(2u32)),
		"outlook.com" | "hotmail.com" | "live.com" => (nonzero!(1u32), nonzero!(1u32)),
		"yahoo.com" => (nonzero!(1u32), nonzero!(1u32)),
		_ => default_quota(),
	}
}

/// Per-domain buckets, keyed by lowercased domain, created lazily on first
/// contact. Guarded by a read-write lock: lookups take the read lock;
/// insertion of a missing domain takes the write lock with a re-check,
/// per spec.md §4.6 and §5's shared-state discipline.
pub struct DomainBuckets {
	buckets: RwLock<HashMap<String, Arc<DirectLimiter>>>,
}

impl DomainBuckets {
	pub fn new() -> Self {
		DomainBuckets {
			buckets: RwLock::new(HashMap::new()),
		}
	}

	/// Blocks until a token is available for `domain`'s bucket, creating it
	/// with the default row from spec.md §4.6's table if this is the
	/// domain's first contact.
	pub async fn acquire(&self, domain: &str) {
		let domain = domain.to_lowercase();

		if let Some(limiter) = self.buckets.read().await.get(&domain) {
			limiter.until_ready().await;
			return;
		}

		let limiter = {
			let mut guard = self.buckets.write().await;
			// Re-check: another task may have created it between the read
			// lock release above and taking the write lock here.
			guard
				.entry(domain.clone())
				.or_insert_with(|| {
					let (rate, burst) = quota_for_domain(&domain);
					Arc::new(RateLimiter::direct(quota(rate, burst)))
				})
				.clone()
		};
		limiter.until_ready().await;
	}
}

impl Default for DomainBuckets {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Instant;

	#[test]
	fn default_quota_applies_to_unlisted_domains() {
		assert_eq!(quota_for_domain("example.com"), default_quota());
	}

	#[test]
	fn known_providers_get_their_table_row() {
		assert_eq!(quota_for_domain("gmail.com"), (nonzero!(2u32), nonzero!(2u32)));
		assert_eq!(quota_for_domain("googlemail.com"), (nonzero!(2u32), nonzero!(2u32)));
		assert_eq!(quota_for_domain("outlook.com"), (nonzero!(1u32), nonzero!(1u32)));
		assert_eq!(quota_for_domain("hotmail.com"), (nonzero!(1u32), nonzero!(1u32)));
		assert_eq!(quota_for_domain("live.com"), (nonzero!(1u32), nonzero!(1u32)));
		assert_eq!(quota_for_domain("yahoo.com"), (nonzero!(1u32), nonzero!(1u32)));
	}

	#[tokio::test]
	async fn domain_lookup_is_case_insensitive() {
		let buckets = DomainBuckets::new();
		buckets.acquire("Gmail.COM").await;
		// A second acquire against the differently-cased same domain must
		// reuse the bucket created above, not create a second one.
		let guard = buckets.buckets.read().await;
		assert_eq!(guard.len(), 1);
		assert!(guard.contains_key("gmail.com"));
	}

	#[tokio::test]
	async fn burst_of_two_drains_then_blocks() {
		let bucket = GlobalBucket::new();
		let start = Instant::now();
		bucket.acquire().await;
		bucket.acquire().await;
		// Both burst tokens should be immediately available.
		assert!(start.elapsed().as_millis() < 50);
	}
}
