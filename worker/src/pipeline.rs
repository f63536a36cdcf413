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

//! Per-task pipeline: syntax -> MX resolve -> domain-rate wait -> dial ->
//! [catch-all probe] -> domain-rate wait -> dial -> SMTP dialog ->
//! classify, matching spec.md §2's data flow and §5's ordering
//! guarantee. The domain token is acquired separately before the probe's
//! connection and before the main dialog's connection, per spec.md
//! §4.5's "each probe connection is subject to global and per-domain
//! pacing".

use std::sync::Arc;

use check_if_email_exists::mx::{resolve_target, MxError, Resolve};
use check_if_email_exists::proxy::{dial, ProxyConfig};
use check_if_email_exists::smtp::catch_all::{probe, ProbeResult};
use check_if_email_exists::smtp::classify::{classify_full, Classification};
use check_if_email_exists::smtp::run_envelope;
use check_if_email_exists::{syntax, ValidationOutcome, WorkItem};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::rate_limit::DomainBuckets;

/// The two ways a task can leave the pipeline: a terminal verdict ready
/// for the store, or a greylisted outcome that must instead go to the
/// Retry Scheduler without touching the row (spec.md §4.8).
pub enum PipelineOutcome {
	Terminal(ValidationOutcome),
	Retry,
}

/// Everything the pipeline needs that isn't per-item: the worker's HELO
/// identity, dev/prod mode, the proxy (if any), the MX resolver, and the
/// shared per-domain rate-limit map. Constructed once at bootstrap and
/// shared by `Arc` across all `N` worker tasks, per spec.md §9's
/// "Services aggregate".
pub struct PipelineContext {
	pub hello_name: String,
	pub is_dev: bool,
	pub proxy: Option<ProxyConfig>,
	pub resolver: Arc<dyn Resolve>,
	pub domain_buckets: Arc<DomainBuckets>,
}

/// Run the full pipeline for `item`. The global rate-limit wait (step 1 of
/// spec.md §4.9) happens in the dispatcher before a work item ever
/// reaches here; this function only covers the syntax-onward steps in
/// spec.md §2's data flow.
pub async fn run(item: &WorkItem, ctx: &PipelineContext) -> PipelineOutcome {
	let syntax_check = syntax::validate(&item.email);
	if !syntax_check.is_valid {
		return PipelineOutcome::Terminal(ValidationOutcome::invalid(550, "Invalid email syntax"));
	}
	let domain = syntax_check.domain.clone();

	let target = match resolve_target(&domain, ctx.is_dev, ctx.resolver.as_ref()).await {
		Ok(target) => target,
		Err(err) => return PipelineOutcome::Terminal(mx_error_outcome(err)),
	};

	if !ctx.is_dev {
		ctx.domain_buckets.acquire(&domain).await;
		match dial(&target, ctx.is_dev, ctx.proxy.as_ref()).await {
			Ok(conn) => {
				let mut rng = StdRng::from_entropy();
				let result = probe(conn, &ctx.hello_name, &domain, &mut rng).await;
				if matches!(result, ProbeResult::CatchAll) {
					return PipelineOutcome::Terminal(ValidationOutcome::catch_all(
						"Catch-all domain detected via probe",
					));
				}
				// Discriminating or ProbeFailed: fall through to the real dialog.
			}
			Err(_) => {
				// Dial failure for the probe itself is absorbed; the real
				// dial below will surface the same failure as Unknown if
				// the MX is genuinely unreachable.
			}
		}
	}

	ctx.domain_buckets.acquire(&domain).await;
	let conn = match dial(&target, ctx.is_dev, ctx.proxy.as_ref()).await {
		Ok(conn) => conn,
		Err(err) => {
			return PipelineOutcome::Terminal(ValidationOutcome::unknown(format!(
				"Connection failed: {err}"
			)))
		}
	};

	let reply = match run_envelope(conn, &ctx.hello_name, &item.email).await {
		Ok(reply) => reply,
		Err(err) => {
			return PipelineOutcome::Terminal(ValidationOutcome::unknown(err.to_string()));
		}
	};

	match classify_full(reply.code) {
		Classification::Greylisted => PipelineOutcome::Retry,
		classification => PipelineOutcome::Terminal(ValidationOutcome {
			status: classification.status(),
			smtp_code: reply.code,
			bounce_reason: reply.text,
			retryable: false,
		}),
	}
}

fn mx_error_outcome(err: MxError) -> ValidationOutcome {
	ValidationOutcome::invalid(550, err.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use check_if_email_exists::Status;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpListener;

	struct FixedResolver {
		host: String,
		port: u16,
	}

	#[async_trait]
	impl Resolve for FixedResolver {
		async fn lookup_mx(&self, _domain: &str) -> Result<Vec<String>, String> {
			let _ = &self.port; // resolve_target in dev mode ignores this; kept for prod-mode tests
			Ok(vec![self.host.clone()])
		}
	}

	fn context(is_dev: bool, resolver: FixedResolver) -> PipelineContext {
		PipelineContext {
			hello_name: "mail.example.org".to_string(),
			is_dev,
			proxy: None,
			resolver: Arc::new(resolver),
			domain_buckets: Arc::new(DomainBuckets::new()),
		}
	}

	#[tokio::test]
	async fn syntax_rejection_short_circuits_before_any_network_action() {
		let ctx = context(
			true,
			FixedResolver {
				host: "unused".to_string(),
				port: 0,
			},
		);
		let item = WorkItem::new("J5", "user@@bad.com");
		match run(&item, &ctx).await {
			PipelineOutcome::Terminal(outcome) => {
				assert_eq!(outcome.status, Status::Invalid);
				assert_eq!(outcome.smtp_code, 550);
				assert_eq!(outcome.bounce_reason, "Invalid email syntax");
			}
			PipelineOutcome::Retry => panic!("expected a terminal outcome"),
		}
	}

	#[tokio::test]
	async fn dead_domain_mx_failure_is_invalid_with_no_dial() {
		struct FailingResolver;
		#[async_trait]
		impl Resolve for FailingResolver {
			async fn lookup_mx(&self, _domain: &str) -> Result<Vec<String>, String> {
				Err("no nameservers reachable".to_string())
			}
		}

		let ctx = PipelineContext {
			hello_name: "mail.example.org".to_string(),
			is_dev: false,
			proxy: None,
			resolver: Arc::new(FailingResolver),
			domain_buckets: Arc::new(DomainBuckets::new()),
		};
		let item = WorkItem::new("J6", "user@dead-domain.invalid");
		match run(&item, &ctx).await {
			PipelineOutcome::Terminal(outcome) => {
				assert_eq!(outcome.status, Status::Invalid);
				assert_eq!(outcome.smtp_code, 550);
				assert!(outcome.bounce_reason.contains("MX lookup failed"));
			}
			PipelineOutcome::Retry => panic!("expected a terminal outcome"),
		}
	}

	#[tokio::test]
	async fn dev_mode_full_dialog_yields_valid() {
		// Dev mode always targets the hard-coded local sink (localhost,
		// 1025), per spec.md §4.2, so the fake server binds there directly.
		let listener = TcpListener::bind("127.0.0.1:1025").await.unwrap();

		let server = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			socket.write_all(b"220 local sink\r\n").await.unwrap();
			let mut buf = [0u8; 512];
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 Hello\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 OK\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 Accepted\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"221 Bye\r\n").await.unwrap();
		});

		let ctx = context(
			true,
			FixedResolver {
				host: "unused".to_string(),
				port: 0,
			},
		);
		let item = WorkItem::new("J1", "good@example.com");
		match run(&item, &ctx).await {
			PipelineOutcome::Terminal(outcome) => {
				assert_eq!(outcome.status, Status::Valid);
				assert_eq!(outcome.smtp_code, 250);
			}
			PipelineOutcome::Retry => panic!("expected a terminal outcome"),
		}
		server.await.unwrap();
	}
}
