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

//! Streaming sessions
//!
//! Each type wraps a [`CallChannel`] and exposes only the operations its call
//! shape allows. Sessions are created by [`crate::client::EchoClient`], live
//! while messages flow and are never reused.

use futures::Stream;
use std::future::Future;
use tracing::debug;

use crate::channel::{CallChannel, RecvHalf, RecvState, SendHalf, SendState};
use crate::error::{RpcError, RpcResult};
use crate::shutdown::CallCancellation;

/// One request in, a lazy finite sequence of responses out
pub struct ServerStreamCall<M> {
    recv: RecvHalf<M>,
    cancellation: CallCancellation,
}

impl<M: Send + 'static> ServerStreamCall<M> {
    pub(crate) fn new<Out: Send + 'static>(channel: CallChannel<Out, M>) -> Self {
        let cancellation = channel.cancellation();
        let (mut send, recv) = channel.into_split();
        // The request went out when the call started
        send.finish();
        Self { recv, cancellation }
    }

    /// Next response, `Ok(None)` once the server ends the stream
    pub async fn recv(&mut self) -> RpcResult<Option<M>> {
        self.recv.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = RpcResult<M>> + Send + 'static {
        self.recv.into_stream()
    }

    pub fn is_complete(&self) -> bool {
        self.recv.is_complete()
    }

    pub fn received(&self) -> u64 {
        self.recv.received()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

/// Many requests in, one response out
pub struct ClientStreamCall<Out, In> {
    channel: CallChannel<Out, In>,
}

impl<Out, In> ClientStreamCall<Out, In>
where
    Out: Send + 'static,
    In: Send + 'static,
{
    pub(crate) fn new(channel: CallChannel<Out, In>) -> Self {
        Self { channel }
    }

    pub async fn send(&mut self, message: Out) -> RpcResult<()> {
        self.channel.send(message).await
    }

    pub fn close_send(&mut self) {
        self.channel.close_send();
    }

    /// The single response. Fails with `ChannelClosed` once it was delivered.
    pub async fn recv(&mut self) -> RpcResult<In> {
        match self.channel.recv().await? {
            Some(message) => Ok(message),
            // Single-response halves turn an early end of stream into an error
            None => Err(RpcError::Transport(tonic::Status::internal("response missing"))),
        }
    }

    /// Half-close and wait for the aggregate response
    pub async fn close_and_recv(&mut self) -> RpcResult<In> {
        self.close_send();
        self.recv().await
    }

    pub fn send_state(&self) -> SendState {
        self.channel.send_state()
    }

    pub fn recv_state(&self) -> RecvState {
        self.channel.recv_state()
    }

    pub fn cancel(&self) {
        self.channel.cancel();
    }
}

/// Many requests in, many responses out, independently paced
pub struct BidiCall<Out, In> {
    channel: CallChannel<Out, In>,
}

impl<Out, In> BidiCall<Out, In>
where
    Out: Send + 'static,
    In: Send + 'static,
{
    pub(crate) fn new(channel: CallChannel<Out, In>) -> Self {
        Self { channel }
    }

    pub async fn send(&mut self, message: Out) -> RpcResult<()> {
        self.channel.send(message).await
    }

    pub async fn recv(&mut self) -> RpcResult<Option<In>> {
        self.channel.recv().await
    }

    pub fn close_send(&mut self) {
        self.channel.close_send();
    }

    pub fn is_receive_complete(&self) -> bool {
        self.channel.is_receive_complete()
    }

    pub fn is_terminated(&self) -> bool {
        self.channel.is_terminated()
    }

    /// Handle that cancels the call from anywhere, including after `split`
    pub fn cancel_handle(&self) -> CallCancellation {
        self.channel.cancellation()
    }

    pub fn cancel(&self) {
        self.channel.cancel();
    }

    /// Separate the directions so each can be driven by its own task
    pub fn split(self) -> (SendHalf<Out>, RecvHalf<In>) {
        self.channel.into_split()
    }

    /// Run both directions as independent tasks and join them at teardown.
    ///
    /// Neither closure can block the other; the call is over once both have
    /// returned. The send half is closed afterwards whatever the sender did.
    pub async fn drive<S, SF, R, RF>(self, sender: S, receiver: R) -> RpcResult<(SF::Output, RF::Output)>
    where
        S: FnOnce(SendHalf<Out>) -> SF,
        SF: Future<Output = SendHalf<Out>> + Send + 'static,
        R: FnOnce(RecvHalf<In>) -> RF,
        RF: Future + Send + 'static,
        RF::Output: Send + 'static,
    {
        let (send, recv) = self.channel.into_split();
        let method = send.method();

        let send_task = tokio::spawn(sender(send));
        let recv_task = tokio::spawn(receiver(recv));

        let (send_result, recv_result) = tokio::join!(send_task, recv_task);
        let to_status = |e: tokio::task::JoinError| RpcError::Transport(tonic::Status::internal(format!("{}: session task failed: {}", method, e)));

        let mut send = send_result.map_err(to_status)?;
        let received = recv_result.map_err(to_status)?;
        send.finish();
        debug!("{} session torn down after sending {} messages", method, send.sent());

        Ok((send, received))
    }
}
