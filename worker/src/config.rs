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

//! Environment ingestion, mode selection, and identity validation, per
//! spec.md §4.10 and §6.

use std::env;

use check_if_email_exists::proxy::ProxyConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("production mode requires SOCKS5_PROXY to be set")]
	MissingProxy,
	#[error("WORKER_HOSTNAME must not be a loopback name in production, got {0:?}")]
	LoopbackIdentityInProduction(String),
	#[error("WORKER_HOSTNAME must be set in production")]
	MissingIdentity,
	#[error("DATABASE_URL must be set")]
	MissingDatabaseUrl,
	#[error("only one of PROXY_USER/PROXY_PASS was set; provide both or neither")]
	PartialProxyCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	Dev,
	Prod,
}

impl Mode {
	pub fn is_dev(self) -> bool {
		matches!(self, Mode::Dev)
	}
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
	pub addr: String,
	pub password: Option<String>,
	pub db: i64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
	pub mode: Mode,
	/// The HELO identity this worker announces. Never a loopback name in
	/// production.
	pub hello_name: String,
	pub proxy: Option<ProxyConfig>,
	pub redis: RedisConfig,
	pub database_url: String,
}

fn is_loopback_name(name: &str) -> bool {
	let lower = name.to_lowercase();
	lower == "localhost" || lower.starts_with("127.")
}

impl WorkerConfig {
	/// Load configuration from the environment, per the table in spec.md
	/// §6. Fails hard (the caller should abort startup) on structural
	/// misconfiguration: missing proxy in production, or a loopback
	/// identity in production.
	pub fn from_env() -> Result<Self, ConfigError> {
		let mode = match env::var("IS_DEV").as_deref() {
			Ok("true") => Mode::Dev,
			_ => Mode::Prod,
		};

		let hello_name = env::var("WORKER_HOSTNAME").unwrap_or_default();
		let hello_name = if hello_name.trim().is_empty() {
			if mode.is_dev() {
				tracing::warn!(
					target: check_if_email_exists::LOG_TARGET,
					"WORKER_HOSTNAME unset in development mode; using loopback identity"
				);
				"localhost".to_string()
			} else {
				return Err(ConfigError::MissingIdentity);
			}
		} else {
			hello_name
		};

		if mode == Mode::Prod && is_loopback_name(&hello_name) {
			return Err(ConfigError::LoopbackIdentityInProduction(hello_name));
		}
		if mode.is_dev() && is_loopback_name(&hello_name) {
			tracing::warn!(
				target: check_if_email_exists::LOG_TARGET,
				hello_name = %hello_name,
				"using a loopback HELO identity; this is only permitted in development mode"
			);
		}

		let proxy = load_proxy_config(mode)?;

		let redis = RedisConfig {
			addr: env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string()),
			password: env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
			db: env::var("REDIS_DB")
				.ok()
				.and_then(|v| v.parse().ok())
				.unwrap_or(0),
		};

		let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

		Ok(WorkerConfig {
			mode,
			hello_name,
			proxy,
			redis,
			database_url,
		})
	}
}

fn load_proxy_config(mode: Mode) -> Result<Option<ProxyConfig>, ConfigError> {
	let Ok(socks5) = env::var("SOCKS5_PROXY") else {
		if mode == Mode::Prod {
			return Err(ConfigError::MissingProxy);
		}
		return Ok(None);
	};

	let (host, port) = socks5
		.rsplit_once(':')
		.ok_or(ConfigError::MissingProxy)?;
	let port: u16 = port.parse().map_err(|_| ConfigError::MissingProxy)?;

	let username = env::var("PROXY_USER").ok().filter(|s| !s.is_empty());
	let password = env::var("PROXY_PASS").ok().filter(|s| !s.is_empty());
	if username.is_some() != password.is_some() {
		return Err(ConfigError::PartialProxyCredentials);
	}

	Ok(Some(ProxyConfig {
		host: host.to_string(),
		port,
		username,
		password,
	}))
}
