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

//! Call channel: the two directions of a single RPC invocation
//!
//! A [`CallChannel`] owns one [`SendHalf`] and one [`RecvHalf`]. The halves keep
//! independent state machines:
//!
//! ```text
//! send:    Open -> HalfClosed -> Closed
//! receive: Open -> Completed(Ok | Error)
//! ```
//!
//! Closing the send side never completes the receive side and vice versa. Both
//! halves share one [`CallCancellation`]; firing it unblocks whichever side is
//! suspended with a terminal error.
//!
//! The stream a send half feeds ends cleanly only after `close_send`. A
//! cancelled, failed or dropped send half ends it with `CANCELLED` instead, so
//! the peer never mistakes an abandoned call for a finished one.

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tonic::Status;
use tracing::{debug, warn};

use crate::error::{Direction, RpcError, RpcResult};
use crate::shutdown::{CallCancellation, ShutdownSignal};

/// Interaction shape of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    BidiStreaming,
}

impl CallShape {
    /// Whether the caller may send more than one message
    pub fn streams_requests(self) -> bool {
        matches!(self, CallShape::ClientStreaming | CallShape::BidiStreaming)
    }

    /// Whether the callee may answer with more than one message
    pub fn streams_responses(self) -> bool {
        matches!(self, CallShape::ServerStreaming | CallShape::BidiStreaming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallShape::Unary => "unary",
            CallShape::ClientStreaming => "client-streaming",
            CallShape::ServerStreaming => "server-streaming",
            CallShape::BidiStreaming => "bidi-streaming",
        }
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Open,
    HalfClosed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Open,
    Completed(Completion),
}

/// Outgoing direction of a call
///
/// Backed by a bounded queue; `send` suspends while the queue is full, which is
/// how transport backpressure reaches the producer.
pub struct SendHalf<M> {
    method: &'static str,
    shape: CallShape,
    sender: Option<mpsc::Sender<Result<M, Status>>>,
    half_closed: Arc<AtomicBool>,
    state: SendState,
    sent: u64,
    cancellation: CallCancellation,
}

impl<M: Send + 'static> SendHalf<M> {
    fn new(
        method: &'static str,
        shape: CallShape,
        sender: mpsc::Sender<Result<M, Status>>,
        half_closed: Arc<AtomicBool>,
        cancellation: CallCancellation,
    ) -> Self {
        Self {
            method,
            shape,
            sender: Some(sender),
            half_closed,
            state: SendState::Open,
            sent: 0,
            cancellation,
        }
    }

    /// Queue one message for the peer
    pub async fn send(&mut self, message: M) -> RpcResult<()> {
        if self.state != SendState::Open {
            return Err(self.closed_error());
        }
        if self.cancellation.is_cancelled() {
            self.terminate();
            return Err(RpcError::Cancelled { method: self.method });
        }

        let Some(sender) = self.sender.as_ref() else {
            return Err(self.closed_error());
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(RpcError::Cancelled { method: self.method }),
            result = sender.send(Ok(message)) => result.map_err(|_| {
                RpcError::Transport(Status::unavailable(format!("{}: peer stopped receiving", self.method)))
            }),
        };

        match outcome {
            Ok(()) => {
                self.sent += 1;
                Ok(())
            }
            Err(e) => {
                debug!("Send side of {} failed: {}", self.method, e);
                self.terminate();
                Err(e)
            }
        }
    }

    /// Signal that no more messages follow. Calling it again has no effect.
    pub fn close_send(&mut self) {
        if self.state == SendState::Open {
            self.half_closed.store(true, Ordering::Release);
            self.sender = None;
            self.state = SendState::HalfClosed;
            debug!("Half-closed send side of {} after {} messages", self.method, self.sent);
        }
    }

    /// Deliver an error terminal to the peer and close this direction.
    ///
    /// If the status cannot be queued before the call is cancelled, the peer
    /// still sees `CANCELLED` rather than a clean end.
    pub async fn abort(&mut self, status: Status) {
        if let Some(sender) = self.sender.take() {
            warn!("Aborting {} with status {:?}: {}", self.method, status.code(), status.message());
            if let Err(mpsc::error::TrySendError::Full(item)) = sender.try_send(Err(status)) {
                tokio::select! {
                    _ = sender.send(item) => {}
                    _ = self.cancellation.cancelled() => {}
                }
            }
        }
        self.state = SendState::Closed;
    }

    /// Mark the direction closed at session teardown
    pub fn finish(&mut self) {
        self.close_send();
        self.state = SendState::Closed;
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    // Dropping the sender without the half-close flag ends the outbound stream with CANCELLED
    fn terminate(&mut self) {
        self.sender = None;
        self.state = SendState::Closed;
    }

    fn closed_error(&self) -> RpcError {
        RpcError::ChannelClosed {
            method: self.method,
            shape: self.shape,
            direction: Direction::Send,
        }
    }
}

/// Stream of what a [`SendHalf`] queued, as the transport consumes it
fn outbound_stream<M: Send + 'static>(
    method: &'static str,
    receiver: mpsc::Receiver<Result<M, Status>>,
    half_closed: Arc<AtomicBool>,
    cancellation: CallCancellation,
) -> BoxStream<'static, Result<M, Status>> {
    stream::unfold(Some(receiver), move |receiver| {
        let half_closed = half_closed.clone();
        let cancellation = cancellation.clone();
        async move {
            let mut receiver = receiver?;
            let next = tokio::select! {
                biased;
                next = receiver.recv() => next,
                _ = cancellation.cancelled(), if !half_closed.load(Ordering::Acquire) => {
                    return Some((Err(Status::cancelled(format!("{}: call cancelled", method))), None));
                }
            };

            match next {
                Some(Ok(message)) => Some((Ok(message), Some(receiver))),
                Some(Err(status)) => Some((Err(status), None)),
                None if half_closed.load(Ordering::Acquire) => None,
                None => {
                    debug!("Send side of {} went away without closing", method);
                    Some((Err(Status::cancelled(format!("{}: sender went away before closing", method))), None))
                }
            }
        }
    })
    .boxed()
}

/// Spawned transport call of a client channel; aborted when the receive half
/// completes with an error or is dropped
struct CallTask(AbortHandle);

impl Drop for CallTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Incoming direction of a call
pub struct RecvHalf<M> {
    method: &'static str,
    shape: CallShape,
    inbound: BoxStream<'static, Result<M, Status>>,
    state: RecvState,
    single: bool,
    received: u64,
    cancellation: CallCancellation,
    task: Option<CallTask>,
}

impl<M: Send + 'static> RecvHalf<M> {
    fn new(method: &'static str, shape: CallShape, inbound: BoxStream<'static, Result<M, Status>>, cancellation: CallCancellation) -> Self {
        Self {
            method,
            shape,
            inbound,
            state: RecvState::Open,
            single: false,
            received: 0,
            cancellation,
            task: None,
        }
    }

    /// Expect exactly one message; it completes the direction
    fn single(mut self) -> Self {
        self.single = true;
        self
    }

    fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = Some(CallTask(task));
        self
    }

    /// Next message, `Ok(None)` at end of stream.
    ///
    /// Exactly one terminal signal (end of stream or error) is returned; every
    /// call after that fails with [`RpcError::ChannelClosed`].
    pub async fn recv(&mut self) -> RpcResult<Option<M>> {
        if self.state != RecvState::Open {
            return Err(RpcError::ChannelClosed {
                method: self.method,
                shape: self.shape,
                direction: Direction::Receive,
            });
        }

        let next = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                self.complete(Completion::Error);
                return Err(RpcError::Cancelled { method: self.method });
            }
            next = self.inbound.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                self.received += 1;
                if self.single {
                    self.complete(Completion::Ok);
                }
                Ok(Some(message))
            }
            Some(Err(status)) => {
                debug!("Receive side of {} failed: {}", self.method, status);
                self.complete(Completion::Error);
                Err(RpcError::Transport(status))
            }
            None if self.single && self.received == 0 => {
                self.complete(Completion::Error);
                Err(RpcError::Transport(Status::internal(format!("{}: stream ended without a response", self.method))))
            }
            None => {
                self.complete(Completion::Ok);
                Ok(None)
            }
        }
    }

    /// Remaining messages as a lazy stream that ends after the terminal signal
    pub fn into_stream(self) -> impl Stream<Item = RpcResult<M>> + Send + 'static {
        stream::unfold(Some(self), |half| async move {
            let mut half = half?;
            match half.recv().await {
                Ok(Some(message)) => Some((Ok(message), Some(half))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, RecvState::Completed(_))
    }

    pub fn state(&self) -> RecvState {
        self.state
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    fn complete(&mut self, completion: Completion) {
        self.state = RecvState::Completed(completion);
        // Drop the transport stream so a cancelled call is reset on the wire
        self.inbound = stream::empty().boxed();
        self.task = None;
    }
}

/// One RPC invocation: a send half, a receive half and their shared cancellation
pub struct CallChannel<Out, In> {
    send: SendHalf<Out>,
    recv: RecvHalf<In>,
    cancellation: CallCancellation,
}

impl<Out, In> CallChannel<Out, In>
where
    Out: Send + 'static,
    In: Send + 'static,
{
    /// Server side of a call: reads the requests tonic decoded (a
    /// [`tonic::Streaming`] for streaming requests) and returns the outbound
    /// stream tonic writes back.
    pub fn server<S>(
        method: &'static str,
        shape: CallShape,
        inbound: S,
        buffer: usize,
        shutdown: Option<ShutdownSignal>,
    ) -> (Self, BoxStream<'static, Result<Out, Status>>)
    where
        S: Stream<Item = Result<In, Status>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let half_closed = Arc::new(AtomicBool::new(false));
        let cancellation = CallCancellation::new(shutdown);
        let outbound = outbound_stream(method, rx, half_closed.clone(), cancellation.clone());

        let send = SendHalf::new(method, shape, tx, half_closed, cancellation.clone());
        let recv = RecvHalf::new(method, shape, inbound.boxed(), cancellation.clone());
        (Self { send, recv, cancellation }, outbound)
    }

    /// Client side of a call. `start` receives the request stream and returns
    /// the response stream; it is driven on its own task so sends progress
    /// before the first receive.
    ///
    /// The task stops when the call is cancelled and is aborted when the
    /// receive half fails or is dropped. The request stream ends cleanly only
    /// after `close_send`; otherwise it ends with an error, which resets the
    /// call on the wire.
    pub(crate) fn client<F, S>(method: &'static str, shape: CallShape, buffer: usize, shutdown: Option<ShutdownSignal>, start: F) -> Self
    where
        F: FnOnce(BoxStream<'static, Result<Out, Status>>) -> S,
        S: Future<Output = Result<BoxStream<'static, Result<In, Status>>, Status>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let half_closed = Arc::new(AtomicBool::new(false));
        let cancellation = CallCancellation::new(shutdown);
        let requests = outbound_stream(method, rx, half_closed.clone(), cancellation.clone());

        let call = start(requests);
        let call_cancellation = cancellation.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = call_cancellation.cancelled() => Err(Status::cancelled(format!("{}: call cancelled", method))),
                responses = call => responses,
            }
        });
        let abort = task.abort_handle();

        let inbound = stream::once(async move {
            match task.await {
                Ok(Ok(responses)) => responses,
                Ok(Err(status)) => stream::once(async move { Err(status) }).boxed(),
                Err(e) => stream::once(async move { Err(Status::cancelled(format!("call task ended: {}", e))) }).boxed(),
            }
        })
        .flatten()
        .boxed();

        let send = SendHalf::new(method, shape, tx, half_closed, cancellation.clone());
        let mut recv = RecvHalf::new(method, shape, inbound, cancellation.clone()).with_task(abort);
        if !shape.streams_responses() {
            recv = recv.single();
        }

        Self { send, recv, cancellation }
    }

    #[cfg(test)]
    fn from_parts(
        method: &'static str,
        shape: CallShape,
        sender: mpsc::Sender<Result<Out, Status>>,
        inbound: BoxStream<'static, Result<In, Status>>,
        cancellation: CallCancellation,
    ) -> Self {
        let send = SendHalf::new(method, shape, sender, Arc::new(AtomicBool::new(false)), cancellation.clone());
        let mut recv = RecvHalf::new(method, shape, inbound, cancellation.clone());
        if !shape.streams_responses() {
            recv = recv.single();
        }
        Self { send, recv, cancellation }
    }

    pub async fn send(&mut self, message: Out) -> RpcResult<()> {
        self.send.send(message).await
    }

    pub async fn recv(&mut self) -> RpcResult<Option<In>> {
        let result = self.recv.recv().await;
        self.settle();
        result
    }

    pub fn close_send(&mut self) {
        self.send.close_send();
        self.settle();
    }

    // A half-closed send side is done once the peer has finished answering
    fn settle(&mut self) {
        if self.recv.is_complete() && self.send.state() == SendState::HalfClosed {
            self.send.finish();
        }
    }

    pub fn is_receive_complete(&self) -> bool {
        self.recv.is_complete()
    }

    /// Tear down both directions; suspended operations return `Cancelled`
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation(&self) -> CallCancellation {
        self.cancellation.clone()
    }

    pub fn send_state(&self) -> SendState {
        self.send.state()
    }

    pub fn recv_state(&self) -> RecvState {
        self.recv.state()
    }

    /// Both directions reached their terminal state
    pub fn is_terminated(&self) -> bool {
        self.send.state() == SendState::Closed && self.recv.is_complete()
    }

    pub fn send_half(&mut self) -> &mut SendHalf<Out> {
        &mut self.send
    }

    pub fn into_split(self) -> (SendHalf<Out>, RecvHalf<In>) {
        (self.send, self.recv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownController;
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::wrappers::ReceiverStream;

    /// Loopback channel: whatever goes out on `send` comes back on `recv`
    fn loopback(shape: CallShape, buffer: usize) -> CallChannel<u32, u32> {
        let (tx, rx) = mpsc::channel(buffer);
        CallChannel::from_parts("Loopback", shape, tx, ReceiverStream::new(rx).boxed(), CallCancellation::new(None))
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let mut channel = loopback(CallShape::BidiStreaming, 4);
        channel.send(1).await.unwrap();
        channel.close_send();

        let err = channel.send(2).await.unwrap_err();
        assert!(err.is_channel_closed());
        assert_eq!(channel.send_state(), SendState::HalfClosed);
    }

    #[tokio::test]
    async fn test_close_send_is_idempotent() {
        let mut channel = loopback(CallShape::BidiStreaming, 4);
        channel.send(7).await.unwrap();
        channel.close_send();
        channel.close_send();

        assert_eq!(channel.recv().await.unwrap(), Some(7));
        assert_eq!(channel.recv().await.unwrap(), None);
        assert_eq!(channel.recv_state(), RecvState::Completed(Completion::Ok));
    }

    #[tokio::test]
    async fn test_single_terminal_signal() {
        let mut channel = loopback(CallShape::BidiStreaming, 4);
        channel.close_send();

        assert_eq!(channel.recv().await.unwrap(), None);
        assert!(channel.recv().await.unwrap_err().is_channel_closed());
        assert!(channel.is_receive_complete());
    }

    #[tokio::test]
    async fn test_single_response_completes_on_first_message() {
        let mut channel = loopback(CallShape::Unary, 4);
        channel.send(42).await.unwrap();

        assert_eq!(channel.recv().await.unwrap(), Some(42));
        assert!(channel.is_receive_complete());
        assert!(channel.recv().await.unwrap_err().is_channel_closed());
    }

    #[tokio::test]
    async fn test_single_response_missing_is_an_error() {
        let mut channel = loopback(CallShape::ClientStreaming, 4);
        channel.close_send();

        match channel.recv().await {
            Err(RpcError::Transport(status)) => assert_eq!(status.code(), tonic::Code::Internal),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert_eq!(channel.recv_state(), RecvState::Completed(Completion::Error));
    }

    #[tokio::test]
    async fn test_error_status_completes_receive_only() {
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        let mut channel: CallChannel<u32, u32> = CallChannel::from_parts("Failing", CallShape::BidiStreaming, out_tx, ReceiverStream::new(rx).boxed(), CallCancellation::new(None));

        tx.send(Err(Status::unavailable("link down"))).await.unwrap();
        assert!(matches!(channel.recv().await, Err(RpcError::Transport(_))));
        assert_eq!(channel.recv_state(), RecvState::Completed(Completion::Error));

        // The other direction is unaffected
        assert_eq!(channel.send_state(), SendState::Open);
        channel.send(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_does_not_require_closed_send() {
        let mut channel = loopback(CallShape::BidiStreaming, 4);
        channel.send(1).await.unwrap();
        channel.send(2).await.unwrap();

        assert_eq!(channel.recv().await.unwrap(), Some(1));
        assert_eq!(channel.recv().await.unwrap(), Some(2));
        assert_eq!(channel.send_state(), SendState::Open);
        assert!(!channel.is_receive_complete());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_suspended_recv() {
        let (_tx, rx) = mpsc::channel::<Result<u32, Status>>(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let cancellation = CallCancellation::new(None);
        let channel: CallChannel<u32, u32> = CallChannel::from_parts("Stalled", CallShape::BidiStreaming, out_tx, ReceiverStream::new(rx).boxed(), cancellation.clone());
        let (_send, mut recv) = channel.into_split();

        let pending = tokio::spawn(async move { recv.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancellation.cancel();

        let result = timeout(Duration::from_secs(1), pending).await.unwrap().unwrap();
        assert!(matches!(result, Err(RpcError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_send_under_backpressure() {
        let (_in_tx, in_rx) = mpsc::channel::<Result<u32, Status>>(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let cancellation = CallCancellation::new(None);
        let channel: CallChannel<u32, u32> = CallChannel::from_parts("Backpressured", CallShape::BidiStreaming, out_tx, ReceiverStream::new(in_rx).boxed(), cancellation.clone());
        let (mut send, _recv) = channel.into_split();

        send.send(1).await.unwrap();
        let blocked = tokio::spawn(async move {
            let result = send.send(2).await;
            (result, send.state())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancellation.cancel();

        let (result, state) = timeout(Duration::from_secs(1), blocked).await.unwrap().unwrap();
        assert!(matches!(result, Err(RpcError::Cancelled { .. })));
        assert_eq!(state, SendState::Closed);
    }

    #[tokio::test]
    async fn test_send_to_departed_peer_is_transport_error() {
        let (out_tx, out_rx) = mpsc::channel(1);
        drop(out_rx);
        let mut channel: CallChannel<u32, u32> = CallChannel::from_parts("Departed", CallShape::ServerStreaming, out_tx, stream::empty().boxed(), CallCancellation::new(None));

        assert!(matches!(channel.send(1).await, Err(RpcError::Transport(_))));
        assert_eq!(channel.send_state(), SendState::Closed);
        assert!(channel.send(2).await.unwrap_err().is_channel_closed());
    }

    #[tokio::test]
    async fn test_abort_delivers_error_to_peer() {
        let (out_tx, out_rx) = mpsc::channel(2);
        let mut channel: CallChannel<u32, u32> = CallChannel::from_parts("Aborted", CallShape::ServerStreaming, out_tx, stream::empty().boxed(), CallCancellation::new(None));
        let mut outbound = ReceiverStream::new(out_rx);

        channel.send(1).await.unwrap();
        channel.send_half().abort(Status::invalid_argument("nope")).await;

        assert_eq!(outbound.next().await.unwrap().unwrap(), 1);
        assert_eq!(outbound.next().await.unwrap().unwrap_err().code(), tonic::Code::InvalidArgument);
        assert!(outbound.next().await.is_none());
        assert_eq!(channel.send_state(), SendState::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_under_backpressure_ends_outbound_with_cancelled() {
        let controller = ShutdownController::new();
        let (mut channel, mut outbound) =
            CallChannel::<u32, u32>::server("Stalled", CallShape::ServerStreaming, stream::empty::<Result<u32, Status>>(), 1, Some(controller.subscribe()));

        channel.send(1).await.unwrap();
        // Nobody reads the outbound stream, so the second send waits for room
        let blocked = tokio::spawn(async move {
            let result = channel.send(2).await;
            (result, channel.send_state())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.shutdown();

        let (result, state) = timeout(Duration::from_secs(1), blocked).await.unwrap().unwrap();
        assert!(matches!(result, Err(RpcError::Cancelled { .. })));
        assert_eq!(state, SendState::Closed);

        assert_eq!(outbound.next().await.unwrap().unwrap(), 1);
        let terminal = timeout(Duration::from_secs(1), outbound.next()).await.unwrap().unwrap();
        assert_eq!(terminal.unwrap_err().code(), tonic::Code::Cancelled);
        assert!(outbound.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_send_half_is_not_a_clean_end() {
        let (channel, mut outbound) = CallChannel::<u32, u32>::server("Dropped", CallShape::BidiStreaming, stream::empty::<Result<u32, Status>>(), 4, None);
        let (mut send, _recv) = channel.into_split();
        send.send(1).await.unwrap();
        drop(send);

        assert_eq!(outbound.next().await.unwrap().unwrap(), 1);
        assert_eq!(outbound.next().await.unwrap().unwrap_err().code(), tonic::Code::Cancelled);
        assert!(outbound.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_send_ends_outbound_cleanly_despite_later_shutdown() {
        let controller = ShutdownController::new();
        let (mut channel, mut outbound) =
            CallChannel::<u32, u32>::server("Closed", CallShape::ServerStreaming, stream::empty::<Result<u32, Status>>(), 4, Some(controller.subscribe()));

        channel.send(1).await.unwrap();
        channel.close_send();
        controller.shutdown();

        assert_eq!(outbound.next().await.unwrap().unwrap(), 1);
        assert!(outbound.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_wakes_idle_outbound_stream() {
        let (channel, mut outbound) = CallChannel::<u32, u32>::server("Idle", CallShape::BidiStreaming, stream::empty::<Result<u32, Status>>(), 4, None);

        let reader = tokio::spawn(async move { outbound.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.cancel();

        let terminal = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert_eq!(terminal.unwrap().unwrap_err().code(), tonic::Code::Cancelled);
    }

    #[tokio::test]
    async fn test_into_stream_ends_after_terminal() {
        let mut channel = loopback(CallShape::ServerStreaming, 8);
        for i in 0..3 {
            channel.send(i).await.unwrap();
        }
        channel.close_send();

        let (_send, recv) = channel.into_split();
        let collected: Vec<u32> = recv.into_stream().map(|r| r.unwrap()).collect().await;
        assert_eq!(collected, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_terminated_only_when_both_sides_terminal() {
        let mut channel = loopback(CallShape::BidiStreaming, 2);
        channel.send(5).await.unwrap();
        assert_eq!(channel.recv().await.unwrap(), Some(5));
        assert!(!channel.is_terminated());

        channel.close_send();
        assert!(!channel.is_terminated());

        assert_eq!(channel.recv().await.unwrap(), None);
        assert_eq!(channel.send_state(), SendState::Closed);
        assert!(channel.is_terminated());
    }

    proptest! {
        #[test]
        fn prop_messages_arrive_in_send_order(values in proptest::collection::vec(any::<u32>(), 0..64), buffer in 1usize..8) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let received = runtime.block_on(async move {
                let channel = loopback(CallShape::BidiStreaming, buffer);
                let (mut send, recv) = channel.into_split();
                let expected = values.clone();

                let producer = tokio::spawn(async move {
                    for value in values {
                        send.send(value).await.unwrap();
                    }
                    send.close_send();
                });

                let received: Vec<u32> = recv.into_stream().map(|r| r.unwrap()).collect().await;
                producer.await.unwrap();
                (expected, received)
            });
            prop_assert_eq!(received.0, received.1);
        }
    }
}
