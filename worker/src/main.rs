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

//! A single long-running process; no flags, per spec.md §6. Exits 0 never
//! (runs until killed); exits non-zero on startup configuration failure.

use std::sync::Arc;

use check_if_email_exists::mx::{Resolve, SystemResolver};
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use worker::config::WorkerConfig;
use worker::dispatch;
use worker::pipeline::PipelineContext;
use worker::queue::Broker;
use worker::rate_limit::{DomainBuckets, GlobalBucket};
use worker::db;
use worker::retry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	dotenvy::dotenv().ok();

	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.init();

	let config = WorkerConfig::from_env().map_err(|err| {
		tracing::error!(target: check_if_email_exists::LOG_TARGET, error = %err, "configuration error, refusing to start");
		err
	})?;

	tracing::info!(
		target: check_if_email_exists::LOG_TARGET,
		mode = ?config.mode,
		hello_name = %config.hello_name,
		"starting worker"
	);

	let pool = db::connect(&config.database_url).await?;

	let redis_url = redis_connection_url(&config.redis);
	let redis_client = redis::Client::open(redis_url)?;
	let redis_conn = ConnectionManager::new(redis_client).await?;
	let broker = Broker::new(redis_conn);

	// In dev mode `resolve_target` bypasses the resolver entirely, but a
	// concrete value still has to exist to build the context.
	let resolver: Arc<dyn Resolve> = Arc::new(SystemResolver::from_system_conf()?);

	let pipeline_ctx = Arc::new(PipelineContext {
		hello_name: config.hello_name.clone(),
		is_dev: config.mode.is_dev(),
		proxy: config.proxy.clone(),
		resolver,
		domain_buckets: Arc::new(DomainBuckets::new()),
	});
	let global_bucket = Arc::new(GlobalBucket::new());

	let cancel = CancellationToken::new();

	let retry_broker = broker.clone();
	let retry_cancel = cancel.clone();
	let retry_handle = tokio::spawn(async move {
		retry::monitor_loop(retry_broker, retry_cancel, now_unix).await;
	});

	let dispatch_handle = tokio::spawn(dispatch::run(
		broker,
		pool,
		pipeline_ctx,
		global_bucket,
		cancel.clone(),
	));

	tokio::signal::ctrl_c().await?;
	tracing::info!(target: check_if_email_exists::LOG_TARGET, "received shutdown signal, draining");
	cancel.cancel();

	let _ = dispatch_handle.await;
	let _ = retry_handle.await;

	Ok(())
}

fn now_unix() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.expect("system clock is after the epoch")
		.as_secs() as i64
}

fn redis_connection_url(redis: &worker::config::RedisConfig) -> String {
	match &redis.password {
		Some(password) => format!("redis://:{password}@{}/{}", redis.addr, redis.db),
		None => format!("redis://{}/{}", redis.addr, redis.db),
	}
}
