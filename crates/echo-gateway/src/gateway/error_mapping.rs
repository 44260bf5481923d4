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

//! Error code mapping between gRPC and HTTP protocols

use echo_runtime::RpcError;
use hyper::StatusCode;
use hyper::body::Bytes;
use serde_json::json;
use tonic::{Code, Status};

/// Maps errors between gRPC and HTTP protocols
pub struct ErrorMapper;

impl ErrorMapper {
    /// Map gRPC status to HTTP status code
    pub fn grpc_to_http_status(status: &Status) -> StatusCode {
        match status.code() {
            Code::Ok => StatusCode::OK,
            Code::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Code::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            Code::Aborted => StatusCode::CONFLICT,
            Code::OutOfRange => StatusCode::BAD_REQUEST,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    /// Map a call-layer error to HTTP status code
    pub fn rpc_to_http_status(error: &RpcError) -> StatusCode {
        match error {
            RpcError::Transport(status) => Self::grpc_to_http_status(status),
            RpcError::TransportSetup(_) => StatusCode::SERVICE_UNAVAILABLE,
            RpcError::Cancelled { .. } => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Terminal line appended to a streamed body that failed mid-stream
    pub fn stream_error_marker(status: &Status) -> Bytes {
        let marker = json!({
            "error": {
                "code": status.code() as i32,
                "message": status.message(),
            }
        });

        let mut line = marker.to_string().into_bytes();
        line.push(b'\n');
        Bytes::from(line)
    }
}
