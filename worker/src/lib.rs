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

//! The concurrent consumer: Config/Bootstrap, Rate Governor, Retry
//! Scheduler, Worker Pool/Dispatcher, and database writeback, built on
//! top of the `check_if_email_exists` core library's network primitives.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod pipeline;
pub mod queue;
pub mod rate_limit;
pub mod retry;
