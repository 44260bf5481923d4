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

//! Typed client for the echo service

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tonic::client::Grpc;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::{debug, info};

use crate::channel::{CallChannel, CallShape};
use crate::codec::AbortableCodec;
use crate::config::{ClientConfig, endpoint_uri};
use crate::error::{RpcError, RpcResult};
use crate::proto::StringMessage;
use crate::proto::echo_service_client::EchoServiceClient;
use crate::session::{BidiCall, ClientStreamCall, ServerStreamCall};
use crate::shutdown::ShutdownSignal;

type Requests = BoxStream<'static, Result<StringMessage, Status>>;
type Responses = BoxStream<'static, Result<StringMessage, Status>>;

const CLIENT_STREAM_PATH: &str = "/echo_service.EchoService/EchoClientStream";
const BIDI_STREAM_PATH: &str = "/echo_service.EchoService/EchoBiDiStream";

async fn unary_call(mut client: EchoServiceClient<Channel>, request: StringMessage) -> Result<Responses, Status> {
    let response = client.echo(request).await?.into_inner();
    Ok(stream::once(future::ready(Ok(response))).boxed())
}

async fn server_stream_call(mut client: EchoServiceClient<Channel>, request: StringMessage) -> Result<Responses, Status> {
    Ok(client.echo_server_stream(request).await?.into_inner().boxed())
}

/// Streaming-request call; an `Err` on `requests` resets the call instead of
/// half-closing it
async fn streaming_call(channel: Channel, path: &'static str, requests: Requests) -> Result<Responses, Status> {
    let mut grpc = Grpc::new(channel);
    grpc.ready().await.map_err(|e| Status::unavailable(format!("echo runtime not ready: {}", e)))?;

    let codec: AbortableCodec<StringMessage, StringMessage> = AbortableCodec::default();
    let responses = grpc.streaming(Request::new(requests), PathAndQuery::from_static(path), codec).await?.into_inner();
    Ok(responses.boxed())
}

/// Echo client; every method opens a fresh call
#[derive(Debug, Clone)]
pub struct EchoClient {
    channel: Channel,
    client: EchoServiceClient<Channel>,
    buffer: usize,
    shutdown: Option<ShutdownSignal>,
}

impl EchoClient {
    /// Dial the runtime and wait for the connection
    pub async fn connect(config: &ClientConfig) -> RpcResult<Self> {
        info!("Connecting to echo runtime at: {}", config.endpoint);

        let channel = Endpoint::from_shared(config.endpoint.clone())?
            .connect_timeout(config.connect_timeout)
            .connect()
            .await?;

        info!("Successfully connected to echo runtime");
        Ok(Self::from_channel(channel).with_buffer(config.stream_buffer_size))
    }

    /// Build a client that dials on first use
    pub fn connect_lazy(endpoint: &str) -> RpcResult<Self> {
        let channel = Endpoint::from_shared(endpoint_uri(endpoint))?.connect_lazy();
        Ok(Self::from_channel(channel))
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: EchoServiceClient::new(channel.clone()),
            channel,
            buffer: ClientConfig::default().stream_buffer_size,
            shutdown: None,
        }
    }

    /// Cancel every call opened by this client once `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Unary `Echo`
    pub async fn echo(&self, request: StringMessage) -> RpcResult<StringMessage> {
        debug!("Calling Echo with: {}", request.value);

        let client = self.client.clone();
        let channel: CallChannel<StringMessage, StringMessage> =
            CallChannel::client("Echo", CallShape::Unary, 1, self.shutdown.clone(), move |_requests| unary_call(client, request));

        let (mut send, mut recv) = channel.into_split();
        send.finish();

        recv.recv()
            .await?
            .ok_or_else(|| RpcError::Transport(Status::internal("Echo: response missing")))
    }

    /// Server-streaming `EchoServerStream`
    pub fn echo_server_stream(&self, request: StringMessage) -> ServerStreamCall<StringMessage> {
        debug!("Opening EchoServerStream with: {}", request.value);

        let client = self.client.clone();
        let channel: CallChannel<StringMessage, StringMessage> =
            CallChannel::client("EchoServerStream", CallShape::ServerStreaming, 1, self.shutdown.clone(), move |_requests| server_stream_call(client, request));

        ServerStreamCall::new(channel)
    }

    /// Client-streaming `EchoClientStream`
    pub fn echo_client_stream(&self) -> ClientStreamCall<StringMessage, StringMessage> {
        debug!("Opening EchoClientStream");

        let channel = self.channel.clone();
        let channel: CallChannel<StringMessage, StringMessage> =
            CallChannel::client("EchoClientStream", CallShape::ClientStreaming, self.buffer, self.shutdown.clone(), move |requests| {
                streaming_call(channel, CLIENT_STREAM_PATH, requests)
            });

        ClientStreamCall::new(channel)
    }

    /// Bidirectional `EchoBiDiStream`
    pub fn echo_bidi_stream(&self) -> BidiCall<StringMessage, StringMessage> {
        debug!("Opening EchoBiDiStream");

        let channel = self.channel.clone();
        let channel: CallChannel<StringMessage, StringMessage> =
            CallChannel::client("EchoBiDiStream", CallShape::BidiStreaming, self.buffer, self.shutdown.clone(), move |requests| {
                streaming_call(channel, BIDI_STREAM_PATH, requests)
            });

        BidiCall::new(channel)
    }
}
