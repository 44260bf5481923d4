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

//! HTTP request/response transcoding for echo calls

use echo_runtime::{EchoClient, StringMessage};
use futures::{StreamExt, future, stream};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Response, StatusCode, header};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

use super::mapping::{Operation, RouteBinding};
use super::streaming_bridge::{NDJSON, StreamingBridge};
use super::GatewayBody;
use crate::error::{ApiError, ApiResult};

/// Turns one HTTP request into one fresh echo call
#[derive(Clone)]
pub struct GrpcHttpTranscoder {
    client: EchoClient,
    request_timeout: Duration,
}

impl GrpcHttpTranscoder {
    pub fn new(client: EchoClient, request_timeout: Duration) -> Self {
        Self { client, request_timeout }
    }

    /// Build the request message from the JSON body and path parameters.
    ///
    /// An empty body is the default message; a path parameter overrides the
    /// field of the same name in the body.
    pub fn decode_request(body: &[u8], params: &HashMap<String, String>) -> ApiResult<StringMessage> {
        let mut message = if body.iter().all(u8::is_ascii_whitespace) {
            StringMessage::default()
        } else {
            serde_json::from_slice::<StringMessage>(body).map_err(|e| ApiError::BadRequest {
                message: format!("Invalid JSON body: {}", e),
            })?
        };

        if let Some(value) = params.get("value") {
            message.value = value.clone();
        }

        Ok(message)
    }

    /// Issue the call for `binding` and render its result
    #[instrument(skip(self, request), fields(operation = %binding.operation))]
    pub async fn transcode(&self, binding: RouteBinding, request: StringMessage) -> ApiResult<Response<GatewayBody>> {
        match binding.operation {
            Operation::Echo => self.unary(request).await,
            Operation::EchoServerStream => self.server_stream(request).await,
            Operation::EchoClientStream | Operation::EchoBiDiStream => Err(ApiError::UnsupportedShape {
                operation: binding.operation.to_string(),
                shape: binding.shape.to_string(),
            }),
        }
    }

    async fn unary(&self, request: StringMessage) -> ApiResult<Response<GatewayBody>> {
        let response = timeout(self.request_timeout, self.client.echo(request))
            .await
            .map_err(|_| self.deadline_error(Operation::Echo))??;

        let body = serde_json::to_vec(&response)?;
        json_response(StatusCode::OK, mime::APPLICATION_JSON.as_ref(), Full::new(Bytes::from(body)).boxed_unsync())
    }

    async fn server_stream(&self, request: StringMessage) -> ApiResult<Response<GatewayBody>> {
        let mut call = self.client.echo_server_stream(request);

        // Failures before the first message still get a proper status code
        let first = timeout(self.request_timeout, call.recv())
            .await
            .map_err(|_| self.deadline_error(Operation::EchoServerStream))??;

        let body = match first {
            Some(message) => {
                let messages = stream::once(future::ready(Ok(message))).chain(call.into_stream());
                StreamingBridge::ndjson_body(Operation::EchoServerStream.as_str(), messages)
            }
            None => {
                debug!("EchoServerStream completed without messages");
                Full::new(Bytes::new()).boxed_unsync()
            }
        };

        json_response(StatusCode::OK, NDJSON, body)
    }

    fn deadline_error(&self, operation: Operation) -> ApiError {
        ApiError::GatewayTimeout {
            message: format!("{} did not respond within {:?}", operation, self.request_timeout),
        }
    }
}

fn json_response(status: StatusCode, content_type: &str, body: GatewayBody) -> ApiResult<Response<GatewayBody>> {
    Ok(Response::builder().status(status).header(header::CONTENT_TYPE, content_type).body(body)?)
}
