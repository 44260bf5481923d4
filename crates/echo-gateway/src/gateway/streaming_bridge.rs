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

//! Server-streaming calls rendered as newline-delimited JSON

use echo_runtime::RpcResult;
use futures::{Stream, StreamExt, stream};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Bytes, Frame};
use serde::Serialize;
use std::convert::Infallible;
use tonic::Status;
use tracing::{debug, warn};

use super::{ErrorMapper, GatewayBody};

pub const NDJSON: &str = "application/x-ndjson";

/// Converts a stream of call results into a chunked HTTP body
pub struct StreamingBridge;

impl StreamingBridge {
    /// One JSON line per message, in arrival order.
    ///
    /// A failed receive or a message that cannot be serialized ends the body
    /// with a single error marker line. Dropping the body drops `messages`,
    /// which cancels the underlying call.
    pub fn ndjson_body<S, M>(method: &'static str, messages: S) -> GatewayBody
    where
        S: Stream<Item = RpcResult<M>> + Send + 'static,
        M: Serialize + Send + 'static,
    {
        let lines = stream::unfold((messages.boxed(), false, 0u64), move |(mut messages, done, count)| async move {
            if done {
                return None;
            }

            match messages.next().await {
                Some(Ok(message)) => match Self::format_line(&message) {
                    Ok(line) => Some((line, (messages, false, count + 1))),
                    Err(e) => {
                        warn!("{}: failed to serialize message {}: {}", method, count, e);
                        let status = Status::internal(format!("failed to serialize message: {}", e));
                        Some((ErrorMapper::stream_error_marker(&status), (messages, true, count)))
                    }
                },
                Some(Err(e)) => {
                    warn!("{}: stream failed after {} messages: {}", method, count, e);
                    let status: Status = e.into();
                    Some((ErrorMapper::stream_error_marker(&status), (messages, true, count)))
                }
                None => {
                    debug!("{}: stream completed after {} messages", method, count);
                    None
                }
            }
        });

        StreamBody::new(lines.map(|line| Ok::<_, Infallible>(Frame::data(line)))).boxed_unsync()
    }

    fn format_line<M: Serialize>(message: &M) -> serde_json::Result<Bytes> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_runtime::{RpcError, StringMessage};
    use serde::ser::Error as _;

    async fn collect_lines(body: GatewayBody) -> Vec<String> {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap().lines().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn test_messages_become_lines_in_order() {
        let messages = stream::iter(vec![Ok(StringMessage::new("a")), Ok(StringMessage::new("b")), Ok(StringMessage::new("c"))]);
        let lines = collect_lines(StreamingBridge::ndjson_body("EchoServerStream", messages)).await;

        assert_eq!(lines, vec![r#"{"value":"a"}"#, r#"{"value":"b"}"#, r#"{"value":"c"}"#]);
    }

    #[tokio::test]
    async fn test_empty_stream_is_empty_body() {
        let messages = stream::iter(Vec::<RpcResult<StringMessage>>::new());
        let lines = collect_lines(StreamingBridge::ndjson_body("EchoServerStream", messages)).await;
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_error_appends_marker_and_ends_body() {
        let messages = stream::iter(vec![
            Ok(StringMessage::new("a")),
            Err(RpcError::Transport(Status::unavailable("runtime went away"))),
            Ok(StringMessage::new("never")),
        ]);
        let lines = collect_lines(StreamingBridge::ndjson_body("EchoServerStream", messages)).await;

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"value":"a"}"#);
        let marker: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(marker["error"]["code"], Status::unavailable("").code() as i32);
        assert_eq!(marker["error"]["message"], "runtime went away");
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refused"))
        }
    }

    #[tokio::test]
    async fn test_serialization_failure_terminates_with_marker() {
        let messages = stream::iter(vec![Ok(Unserializable), Ok(Unserializable)]);
        let lines = collect_lines(StreamingBridge::ndjson_body("EchoServerStream", messages)).await;

        assert_eq!(lines.len(), 1);
        let marker: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(marker["error"]["code"], 13);
    }
}
