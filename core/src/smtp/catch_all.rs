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

//! Opens a sibling SMTP session using a random local part to decide
//! whether a domain is catch-all, per spec.md §4.5. Only entered in
//! production mode, and only before the real `RCPT TO`.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::proxy::Conn;
use crate::smtp::run_envelope;

const RANDOM_LOCAL_PART_LEN: usize = 15;

/// Whether the probe concluded the domain is catch-all, discriminating, or
/// the probe attempt itself failed (treated as non-catch-all, absorbing
/// the cost, per spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
	CatchAll,
	Discriminating,
	ProbeFailed,
}

/// Generate a 15-character cryptographically random alphanumeric local
/// part using `rng`. Taking the RNG as a parameter lets tests supply a
/// seeded `StdRng` for determinism, while production wiring seeds from OS
/// entropy (spec.md §9 "Randomness for the catch-all probe").
pub fn random_local_part<R: Rng + ?Sized>(rng: &mut R) -> String {
	(0..RANDOM_LOCAL_PART_LEN)
		.map(|_| rng.sample(Alphanumeric) as char)
		.collect()
}

/// Run the probe: dial `conn`, drive the envelope up to `RCPT
/// TO:<random@domain>`, and classify the domain per spec.md §4.5's
/// decision table (250/251/252 -> catch-all, any 5xx -> discriminating,
/// dial/read failure -> treated as non-catch-all).
pub async fn probe<R: Rng + ?Sized>(
	conn: Conn,
	identity: &str,
	domain: &str,
	rng: &mut R,
) -> ProbeResult {
	let random_email = format!("{}@{}", random_local_part(rng), domain);

	match run_envelope(conn, identity, &random_email).await {
		Ok(reply) => match reply.code {
			250 | 251 | 252 => ProbeResult::CatchAll,
			500..=599 => ProbeResult::Discriminating,
			_ => ProbeResult::ProbeFailed,
		},
		Err(_) => ProbeResult::ProbeFailed,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::{TcpListener, TcpStream};

	#[test]
	fn random_local_part_has_requested_length() {
		let mut rng = rand::rngs::StdRng::seed_from_u64(42);
		let part = random_local_part(&mut rng);
		assert_eq!(part.len(), RANDOM_LOCAL_PART_LEN);
		assert!(part.chars().all(|c| c.is_ascii_alphanumeric()));
	}

	#[tokio::test]
	async fn probe_250_means_catch_all() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let server = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			socket.write_all(b"220 mx.catchall.test ESMTP\r\n").await.unwrap();
			let mut buf = [0u8; 512];
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 Hello\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 OK\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 OK\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"221 Bye\r\n").await.unwrap();
		});

		let conn: Conn = Box::new(TcpStream::connect(addr).await.unwrap());
		let mut rng = rand::rngs::StdRng::seed_from_u64(1);
		let result = probe(conn, "mail.example.org", "catchall.test", &mut rng).await;
		assert_eq!(result, ProbeResult::CatchAll);
		server.await.unwrap();
	}

	#[tokio::test]
	async fn probe_5xx_means_discriminating() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let server = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			socket.write_all(b"220 mx.example.com ESMTP\r\n").await.unwrap();
			let mut buf = [0u8; 512];
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 Hello\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 OK\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"550 No such user\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"221 Bye\r\n").await.unwrap();
		});

		let conn: Conn = Box::new(TcpStream::connect(addr).await.unwrap());
		let mut rng = rand::rngs::StdRng::seed_from_u64(2);
		let result = probe(conn, "mail.example.org", "example.com", &mut rng).await;
		assert_eq!(result, ProbeResult::Discriminating);
		server.await.unwrap();
	}

	#[tokio::test]
	async fn server_closing_before_greeting_is_treated_as_non_catch_all() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let server = tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			drop(socket); // close immediately, no greeting sent
		});

		let conn: Conn = Box::new(TcpStream::connect(addr).await.unwrap());
		let mut rng = rand::rngs::StdRng::seed_from_u64(3);
		let result = probe(conn, "mail.example.org", "example.com", &mut rng).await;
		assert_eq!(result, ProbeResult::ProbeFailed);
		server.await.unwrap();
	}
}
