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

//! gRPC-HTTP gateway
//!
//! Static route table, request/response transcoding for unary and
//! server-streaming calls, and the gRPC to HTTP error mapping.

pub mod error_mapping;
pub mod mapping;
pub mod streaming_bridge;
pub mod transcoder;

use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Bytes;
use std::convert::Infallible;

pub use error_mapping::ErrorMapper;
pub use mapping::{Operation, ResolvedRoute, RouteBinding, RouteTable};
pub use streaming_bridge::StreamingBridge;
pub use transcoder::GrpcHttpTranscoder;

/// Response body shared by buffered and streamed responses
pub type GatewayBody = UnsyncBoxBody<Bytes, Infallible>;
