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

//! Echo runtime
//!
//! gRPC echo service exposing unary, server-streaming, client-streaming and
//! bidirectional-streaming calls, together with the call channel and session
//! machinery both the server handlers and the typed client are built on.

pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod server;
pub mod services;
pub mod session;
pub mod shutdown;

pub mod proto {
    tonic::include_proto!("echo_service");
}

pub use channel::{CallChannel, CallShape, Completion, RecvHalf, RecvState, SendHalf, SendState};
pub use client::EchoClient;
pub use config::{ClientConfig, EmptyStreamPolicy, RuntimeConfig};
pub use error::{RpcError, RpcResult};
pub use proto::StringMessage;
pub use server::RuntimeServer;
pub use services::EchoServiceImpl;
pub use session::{BidiCall, ClientStreamCall, ServerStreamCall};
pub use shutdown::{CallCancellation, ShutdownController, ShutdownSignal};

impl StringMessage {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}
