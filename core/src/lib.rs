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

//! Network-facing primitives for validating whether an email address is
//! deliverable, by driving the SMTP envelope dialog (up to and excluding
//! `DATA`) against the recipient's mail exchanger.
//!
//! This crate is deliberately narrow: it knows how to check the syntax of
//! one address, resolve one domain's MX host, dial it (directly or via
//! SOCKS5), speak the envelope dialog, run the catch-all probe, and
//! classify a reply code. It does not know about queues, rate limiting,
//! retries, or databases (those are the `worker` binary's job).

pub mod mx;
pub mod proxy;
pub mod smtp;
pub mod syntax;
pub mod util;

pub use util::constants::LOG_TARGET;
pub use util::input_output::{Status, ValidationOutcome, WorkItem};
