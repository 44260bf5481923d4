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

//! Error types shared by the call channel, the service and the client

use thiserror::Error;
use tonic::{Code, Status};

use crate::channel::CallShape;

/// Errors raised while driving a call
#[derive(Error, Debug)]
pub enum RpcError {
    /// The peer or the connection failed; surfaced as-is, never retried here
    #[error("Transport error: {0}")]
    Transport(#[from] Status),

    /// Dialling, binding or serving failed below the call layer
    #[error("Transport setup error: {0}")]
    TransportSetup(#[from] tonic::transport::Error),

    /// Operation on a direction that already reached its terminal state
    #[error("Channel closed: {direction} side of {method} ({shape}) is already terminal")]
    ChannelClosed {
        method: &'static str,
        shape: CallShape,
        direction: Direction,
    },

    #[error("Call cancelled: {method}")]
    Cancelled { method: &'static str },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Direction of a call an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Receive => f.write_str("receive"),
        }
    }
}

impl RpcError {
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, RpcError::ChannelClosed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RpcError::Cancelled { .. }) || matches!(self, RpcError::Transport(status) if status.code() == Code::Cancelled)
    }
}

impl From<RpcError> for Status {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::Transport(status) => status,
            RpcError::TransportSetup(e) => Status::unavailable(e.to_string()),
            RpcError::ChannelClosed { .. } => Status::failed_precondition(error.to_string()),
            RpcError::Cancelled { .. } => Status::cancelled(error.to_string()),
            RpcError::InvalidConfig { .. } => Status::internal(error.to_string()),
            RpcError::Io(e) => Status::internal(format!("IO error: {}", e)),
        }
    }
}

/// Result type for call operations
pub type RpcResult<T> = Result<T, RpcError>;
