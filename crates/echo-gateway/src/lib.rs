// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! JSON-over-HTTP gateway for the echo gRPC service
//!
//! Each HTTP request is resolved against a static route table, translated into
//! exactly one fresh call on the echo runtime and rendered back as JSON.
//! Server-streaming calls are rendered as newline-delimited JSON.

pub mod config;
pub mod error;
pub mod gateway;
pub mod router;
pub mod server;

pub use config::Config;
pub use error::{ApiError, ApiResult, ProblemDetails};
pub use router::Router;
pub use server::ApiServer;
