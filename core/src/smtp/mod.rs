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

//! Drives the minimal SMTP envelope dialog (`HELO`/`MAIL FROM`/`RCPT
//! TO`/`QUIT`), up to and excluding `DATA`, per spec.md §4.4. Plaintext,
//! port 25 only; no TLS negotiation of any kind.

pub mod catch_all;
pub mod classify;

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::proxy::Conn;

/// The whole envelope dialog, from connect to `QUIT`, must complete within
/// this deadline.
pub const DIALOG_DEADLINE: Duration = Duration::from_secs(10);

/// A fixed, neutral mailbox used in `MAIL FROM`. The remote need only
/// accept it; spec.md §9 leaves exposing this as configuration as an open
/// decision we do not take here, since no caller in this system needs to
/// vary it.
pub const SENDER_MAILBOX: &str = "check@yourdomain.com";

#[derive(Debug, Error)]
pub enum SmtpError {
	#[error("connection closed before a reply was received")]
	ConnectionClosed,
	#[error("I/O error: {0}")]
	Io(String),
	#[error("dialog did not complete within {0:?}")]
	Timeout(Duration),
	#[error("unexpected reply during {stage}: {code} {text}")]
	UnexpectedReply {
		stage: &'static str,
		code: u16,
		text: String,
	},
}

/// A parsed SMTP reply: the three-digit code of the *last* line, and the
/// text of that line with the code and separator stripped. Multi-line
/// replies (`250-...` continuation lines followed by a final `250 ...`)
/// are read and discarded up to the final line, since the envelope dialog
/// only ever needs to know the final disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
	pub code: u16,
	pub text: String,
}

/// One SMTP session: a single TCP (or SOCKS5-tunnelled) connection, driven
/// through the envelope state machine in spec.md §4.4.
pub struct Session {
	reader: BufReader<Conn>,
}

impl Session {
	/// Wraps an already-dialed connection. Does not itself read the 220
	/// greeting; call [`Session::read_greeting`] first.
	pub fn new(conn: Conn) -> Self {
		Session {
			reader: BufReader::new(conn),
		}
	}

	async fn read_reply(&mut self) -> Result<Reply, SmtpError> {
		let mut last: Option<Reply> = None;
		loop {
			let mut line = String::new();
			let n = self
				.reader
				.read_line(&mut line)
				.await
				.map_err(|e| SmtpError::Io(e.to_string()))?;
			if n == 0 {
				return Err(SmtpError::ConnectionClosed);
			}
			let line = line.trim_end_matches(['\r', '\n']);
			if line.len() < 4 {
				return Err(SmtpError::Io(format!("malformed reply line: {line:?}")));
			}
			let code: u16 = line[..3]
				.parse()
				.map_err(|_| SmtpError::Io(format!("non-numeric reply code: {line:?}")))?;
			let continues = line.as_bytes()[3] == b'-';
			let text = line[4.min(line.len())..].to_string();
			last = Some(Reply { code, text });
			if !continues {
				break;
			}
		}
		last.ok_or(SmtpError::ConnectionClosed)
	}

	async fn send_command(&mut self, command: &str) -> Result<(), SmtpError> {
		self.reader
			.get_mut()
			.write_all(command.as_bytes())
			.await
			.map_err(|e| SmtpError::Io(e.to_string()))?;
		Ok(())
	}

	/// `CONNECTED --recv 220--> GREETED`. Anything else is a failure for
	/// the attempt.
	pub async fn read_greeting(&mut self) -> Result<Reply, SmtpError> {
		let reply = self.read_reply().await?;
		if reply.code != 220 {
			return Err(SmtpError::UnexpectedReply {
				stage: "greeting",
				code: reply.code,
				text: reply.text,
			});
		}
		Ok(reply)
	}

	/// `GREETED --HELO--> HELO_OK`.
	pub async fn helo(&mut self, identity: &str) -> Result<(), SmtpError> {
		self.send_command(&format!("HELO {identity}\r\n")).await?;
		let reply = self.read_reply().await?;
		if reply.code != 250 {
			return Err(SmtpError::UnexpectedReply {
				stage: "HELO",
				code: reply.code,
				text: reply.text,
			});
		}
		Ok(())
	}

	/// `HELO_OK --MAIL FROM--> FROM_OK`.
	pub async fn mail_from(&mut self) -> Result<(), SmtpError> {
		self.send_command(&format!("MAIL FROM:<{SENDER_MAILBOX}>\r\n"))
			.await?;
		let reply = self.read_reply().await?;
		if reply.code != 250 {
			return Err(SmtpError::UnexpectedReply {
				stage: "MAIL FROM",
				code: reply.code,
				text: reply.text,
			});
		}
		Ok(())
	}

	/// `FROM_OK --RCPT TO--> RCPT_REPLY`. This is the only step that drives
	/// the verdict; `DATA` is never sent.
	pub async fn rcpt_to(&mut self, email: &str) -> Result<Reply, SmtpError> {
		self.send_command(&format!("RCPT TO:<{email}>\r\n")).await?;
		self.read_reply().await
	}

	/// `RCPT_REPLY --QUIT--> DONE`. Best-effort: its reply is discarded and
	/// any error is swallowed, matching spec.md §4.4.
	pub async fn quit(&mut self) {
		let _ = self.send_command("QUIT\r\n").await;
		let _ = self.read_reply().await;
	}
}

/// Runs the dialog up to and including `RCPT TO` for `email`, under the
/// overall 10s deadline from spec.md §4.4. On success, returns the reply
/// to `RCPT TO` (the only step that drives the verdict). `QUIT` is always
/// sent best-effort before returning, success or failure.
pub async fn run_envelope(
	conn: Conn,
	identity: &str,
	email: &str,
) -> Result<Reply, SmtpError> {
	let dialog = async move {
		let mut session = Session::new(conn);
		session.read_greeting().await?;
		session.helo(identity).await?;
		session.mail_from().await?;
		let reply = session.rcpt_to(email).await;
		session.quit().await;
		reply
	};

	match tokio::time::timeout(DIALOG_DEADLINE, dialog).await {
		Ok(result) => result,
		Err(_) => {
			tracing::debug!(
				target: crate::LOG_TARGET,
				email,
				"SMTP dialog exceeded the 10s deadline"
			);
			Err(SmtpError::Timeout(DIALOG_DEADLINE))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::AsyncReadExt;
	use tokio::net::{TcpListener, TcpStream};

	#[tokio::test]
	async fn full_dialog_yields_250_on_accept() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		let server = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			socket.write_all(b"220 mx.example.com ESMTP\r\n").await.unwrap();
			let mut buf = [0u8; 512];
			let _ = socket.read(&mut buf).await.unwrap(); // HELO
			socket.write_all(b"250 Hello\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap(); // MAIL FROM
			socket.write_all(b"250 OK\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap(); // RCPT TO
			socket.write_all(b"250 Accepted\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap(); // QUIT
			socket.write_all(b"221 Bye\r\n").await.unwrap();
		});

		let conn: Conn = Box::new(TcpStream::connect(addr).await.unwrap());
		let reply = run_envelope(conn, "mail.example.org", "good@example.com")
			.await
			.unwrap();
		assert_eq!(reply.code, 250);
		server.await.unwrap();
	}

	#[tokio::test]
	async fn rcpt_reply_carries_code_and_text() {
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
		let reply = run_envelope(conn, "mail.example.org", "no-user@example.com")
			.await
			.unwrap();
		assert_eq!(reply.code, 550);
		assert_eq!(reply.text, "No such user");
		server.await.unwrap();
	}

	#[tokio::test]
	async fn multiline_helo_reply_is_followed_to_final_line() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		let server = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			socket.write_all(b"220 mx.example.com ESMTP\r\n").await.unwrap();
			let mut buf = [0u8; 512];
			let _ = socket.read(&mut buf).await.unwrap();
			socket
				.write_all(b"250-mx.example.com\r\n250-PIPELINING\r\n250 8BITMIME\r\n")
				.await
				.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 OK\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"250 Accepted\r\n").await.unwrap();
			let _ = socket.read(&mut buf).await.unwrap();
			socket.write_all(b"221 Bye\r\n").await.unwrap();
		});

		let conn: Conn = Box::new(TcpStream::connect(addr).await.unwrap());
		let reply = run_envelope(conn, "mail.example.org", "good@example.com")
			.await
			.unwrap();
		assert_eq!(reply.code, 250);
		server.await.unwrap();
	}
}
