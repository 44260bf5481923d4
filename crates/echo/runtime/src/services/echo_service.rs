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

//! Echo service implementation for gRPC
//!
//! Every handler answers with the `value` it received. Streaming handlers run
//! their loop on a spawned task that feeds a bounded outbound queue, so reading
//! requests and writing responses progress independently.

use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::Stream;
use tonic::{Request, Response, Result as TonicResult, Status, Streaming};
use tracing::{debug, error, info, instrument, warn};

use crate::channel::{CallChannel, CallShape};
use crate::config::{EmptyStreamPolicy, RuntimeConfig};
use crate::proto::StringMessage;
use crate::proto::echo_service_server::EchoService;
use crate::shutdown::{CallCancellation, ShutdownSignal};

type ResponseStream = Pin<Box<dyn Stream<Item = Result<StringMessage, Status>> + Send>>;

/// Echo service; holds only read-only configuration, each call is independent
#[derive(Debug, Clone)]
pub struct EchoServiceImpl {
    config: Arc<RuntimeConfig>,
    shutdown: Option<ShutdownSignal>,
}

impl Default for EchoServiceImpl {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl EchoServiceImpl {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: None,
        }
    }

    /// Cancel in-flight streams when `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Echo every request on `inbound` back from a spawned task
    fn spawn_bidi_echo<S>(&self, inbound: S) -> ResponseStream
    where
        S: Stream<Item = Result<StringMessage, Status>> + Send + 'static,
    {
        let (channel, outbound) = CallChannel::<StringMessage, StringMessage>::server(
            "EchoBiDiStream",
            CallShape::BidiStreaming,
            inbound,
            self.config.stream_buffer_size,
            self.shutdown.clone(),
        );

        tokio::spawn(async move {
            let (mut send, mut recv) = channel.into_split();
            let mut echoing = true;

            loop {
                match recv.recv().await {
                    Ok(Some(message)) => {
                        debug!("Value from client: {}", message.value);
                        if !echoing {
                            continue;
                        }
                        if let Err(e) = send.send(message).await {
                            // Keep draining; the receive direction is unaffected
                            warn!("EchoBiDiStream stopped echoing: {}", e);
                            echoing = false;
                        }
                    }
                    Ok(None) => {
                        send.close_send();
                        break;
                    }
                    Err(e) => {
                        error!("Error while reading EchoBiDiStream requests: {}", e);
                        send.abort(e.into()).await;
                        break;
                    }
                }
            }

            send.finish();
            info!("EchoBiDiStream finished: {} received, {} echoed", recv.received(), send.sent());
        });

        outbound
    }
}

/// Sleep between two streamed copies; returns false if the call was cancelled meanwhile
async fn pace(interval: Duration, cancellation: &CallCancellation) -> bool {
    if interval.is_zero() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = cancellation.cancelled() => false,
    }
}

#[tonic::async_trait]
impl EchoService for EchoServiceImpl {
    type EchoServerStreamStream = ResponseStream;
    type EchoBiDiStreamStream = ResponseStream;

    #[instrument(skip(self, request))]
    async fn echo(&self, request: Request<StringMessage>) -> TonicResult<Response<StringMessage>> {
        let value = request.into_inner().value;
        info!("Echo called with: {}", value);

        Ok(Response::new(StringMessage { value }))
    }

    #[instrument(skip(self, request))]
    async fn echo_server_stream(&self, request: Request<StringMessage>) -> TonicResult<Response<Self::EchoServerStreamStream>> {
        let req = request.into_inner();
        info!("EchoServerStream called with: {}", req.value);

        let (mut channel, outbound) = CallChannel::<StringMessage, StringMessage>::server(
            "EchoServerStream",
            CallShape::ServerStreaming,
            stream::iter([Ok(req)]),
            self.config.stream_buffer_size,
            self.shutdown.clone(),
        );
        let repeat_count = self.config.repeat_count;
        let interval = self.config.stream_interval;

        tokio::spawn(async move {
            let message = match channel.recv().await {
                Ok(Some(message)) => message,
                _ => return,
            };
            let cancellation = channel.cancellation();

            for sent in 1..=repeat_count {
                // A failed send leaves the outbound stream to end with CANCELLED
                if let Err(e) = channel.send(message.clone()).await {
                    warn!("EchoServerStream stopped after {} of {} messages: {}", sent - 1, repeat_count, e);
                    return;
                }
                debug!("EchoServerStream sent {}/{}", sent, repeat_count);

                if sent < repeat_count && !pace(interval, &cancellation).await {
                    channel.send_half().abort(Status::cancelled("server shutting down")).await;
                    return;
                }
            }

            channel.close_send();
            info!("EchoServerStream finished after {} messages", repeat_count);
        });

        Ok(Response::new(outbound))
    }

    #[instrument(skip(self, request))]
    async fn echo_client_stream(&self, request: Request<Streaming<StringMessage>>) -> TonicResult<Response<StringMessage>> {
        info!("EchoClientStream called");

        let (channel, _outbound) =
            CallChannel::<StringMessage, StringMessage>::server("EchoClientStream", CallShape::ClientStreaming, request.into_inner(), 1, self.shutdown.clone());
        let (mut send, mut recv) = channel.into_split();

        let mut last: Option<StringMessage> = None;
        while let Some(message) = recv.recv().await? {
            debug!("Message from client: {}", message.value);
            last = Some(message);
        }
        send.finish();

        info!("Finished reading {} messages from client", recv.received());

        match (last, self.config.empty_stream_policy) {
            (Some(message), _) => Ok(Response::new(message)),
            (None, EmptyStreamPolicy::EmptyMessage) => Ok(Response::new(StringMessage::default())),
            (None, EmptyStreamPolicy::Reject) => Err(Status::invalid_argument("EchoClientStream received no messages")),
        }
    }

    #[instrument(skip(self, request))]
    async fn echo_bi_di_stream(&self, request: Request<Streaming<StringMessage>>) -> TonicResult<Response<Self::EchoBiDiStreamStream>> {
        info!("EchoBiDiStream called");
        Ok(Response::new(self.spawn_bidi_echo(request.into_inner())))
    }
}
