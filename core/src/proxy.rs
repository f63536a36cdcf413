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

//! Acquires the TCP connection that the SMTP conversationalist will speak
//! over. In development mode, this is a direct dial to the local sink; in
//! production, it is always a SOCKS5 tunnel, there is no fallback to a
//! direct connection if the tunnel fails.

use std::time::Duration;

use fast_socks5::client::{Config as Socks5Config, Socks5Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::mx::Target;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// SOCKS5 egress tunnel configuration. Presence is mandatory in
/// production mode (spec.md §3 "Proxy Config").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
	pub host: String,
	pub port: u16,
	pub username: Option<String>,
	pub password: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProxyError {
	#[error("production mode requires a configured SOCKS5 proxy, but none was set")]
	MissingProxyConfig,
	#[error("Connection failed: {0}")]
	ConnectFailed(String),
	#[error("Connection failed: timed out after {0:?}")]
	Timeout(Duration),
}

/// Either side of a dial: a direct TCP stream, or one tunnelled through
/// SOCKS5. Boxed so the SMTP conversationalist doesn't need to know which.
pub type Conn = Box<dyn AsyncReadWrite>;

/// Marker trait tying `AsyncRead + AsyncWrite` together behind a single
/// trait object.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

/// Dial `target`, per the matrix in spec.md §4.3:
///
/// | Mode | Proxy configured | Action                                |
/// |------|-------------------|----------------------------------------|
/// | dev  | any               | direct TCP dial                        |
/// | prod | yes               | SOCKS5 dial, with auth if both are set |
/// | prod | no                | refuse; never dial directly            |
///
/// A SOCKS5 failure is terminal for the attempt, there is no fallback to a
/// direct connection.
pub async fn dial(
	target: &Target,
	is_dev: bool,
	proxy: Option<&ProxyConfig>,
) -> Result<Conn, ProxyError> {
	let connect = async {
		if is_dev {
			dial_direct(target).await
		} else {
			match proxy {
				Some(proxy) => dial_via_socks5(target, proxy).await,
				None => {
					tracing::warn!(
						target: crate::LOG_TARGET,
						host = %target.host,
						"refusing to dial in production: no SOCKS5 proxy configured"
					);
					Err(ProxyError::MissingProxyConfig)
				}
			}
		}
	};

	match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
		Ok(result) => result,
		Err(_) => Err(ProxyError::Timeout(CONNECT_TIMEOUT)),
	}
}

async fn dial_direct(target: &Target) -> Result<Conn, ProxyError> {
	let stream = TcpStream::connect((target.host.as_str(), target.port))
		.await
		.map_err(|e| ProxyError::ConnectFailed(e.to_string()))?;
	Ok(Box::new(stream))
}

async fn dial_via_socks5(target: &Target, proxy: &ProxyConfig) -> Result<Conn, ProxyError> {
	let config = Socks5Config::default();

	let stream = match (&proxy.username, &proxy.password) {
		(Some(username), Some(password)) => Socks5Stream::connect_with_password(
			(proxy.host.as_str(), proxy.port),
			target.host.clone(),
			target.port,
			username.clone(),
			password.clone(),
			config,
		)
		.await
		.map_err(|e| ProxyError::ConnectFailed(e.to_string()))?,
		_ => Socks5Stream::connect(
			(proxy.host.as_str(), proxy.port),
			target.host.clone(),
			target.port,
			config,
		)
		.await
		.map_err(|e| ProxyError::ConnectFailed(e.to_string()))?,
	};

	Ok(Box::new(stream))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn prod_without_proxy_config_is_refused() {
		let target = Target {
			host: "mx.example.com".to_string(),
			port: 25,
		};
		let err = dial(&target, false, None).await.unwrap_err();
		assert!(matches!(err, ProxyError::MissingProxyConfig));
	}

	#[tokio::test]
	async fn dev_mode_dials_direct_to_local_sink() {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let accept = tokio::spawn(async move { listener.accept().await });

		let target = Target {
			host: "127.0.0.1".to_string(),
			port,
		};
		let result = dial(&target, true, None).await;
		assert!(result.is_ok());
		accept.await.unwrap().unwrap();
	}
}
