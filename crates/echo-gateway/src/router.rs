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

//! HTTP routing for the gateway

use echo_runtime::EchoClient;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode, header};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{GatewayBody, GrpcHttpTranscoder, RouteTable};

/// HTTP router for the gateway
pub struct Router {
    routes: RouteTable,
    transcoder: GrpcHttpTranscoder,
    docs_path: String,
    docs_file: Option<PathBuf>,
    max_body_size: usize,
}

impl Router {
    pub fn new(config: &Config, client: EchoClient) -> ApiResult<Self> {
        Ok(Self {
            routes: RouteTable::new()?,
            transcoder: GrpcHttpTranscoder::new(client, config.request_timeout),
            docs_path: config.docs_path.clone(),
            docs_file: config.docs_file.clone(),
            max_body_size: config.max_body_size,
        })
    }

    /// Route a request, rendering any failure as problem details
    pub async fn handle<B>(&self, req: Request<B>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = req.uri().path().to_string();

        match self.route(req).await {
            Ok(response) => response,
            Err(e) => {
                if !e.status_code().is_server_error() {
                    warn!("Request to {} failed: {}", path, e);
                }
                e.into_response(&path).map(|body| body.boxed_unsync())
            }
        }
    }

    /// Route a request to the docs file or to a gateway operation
    pub async fn route<B>(&self, req: Request<B>) -> ApiResult<Response<GatewayBody>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        info!("Routing request: {} {}", method, path);

        if path == self.docs_path {
            if method != Method::GET {
                return Err(ApiError::MethodNotAllowed {
                    message: format!("{} {} (allowed: GET)", method, path),
                });
            }
            return self.serve_docs().await;
        }

        let route = self.routes.resolve(&method, &path)?;

        let body = if method == Method::GET {
            Bytes::new()
        } else {
            self.read_body(req.into_body()).await?
        };

        let request = GrpcHttpTranscoder::decode_request(&body, &route.params)?;
        debug!("Resolved {} {} to {} ({})", method, path, route.binding.operation, route.binding.shape);

        self.transcoder.transcode(route.binding, request).await
    }

    async fn read_body<B>(&self, body: B) -> ApiResult<Bytes>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let collected = Limited::new(body, self.max_body_size).collect().await.map_err(|e| ApiError::BadRequest {
            message: format!("Failed to read request body (limit {} bytes): {}", self.max_body_size, e),
        })?;
        Ok(collected.to_bytes())
    }

    async fn serve_docs(&self) -> ApiResult<Response<GatewayBody>> {
        let Some(file) = &self.docs_file else {
            return Err(ApiError::NotFound {
                message: "No interface description is configured".to_string(),
            });
        };

        let contents = match tokio::fs::read(file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::NotFound {
                    message: format!("Interface description {} does not exist", file.display()),
                });
            }
            Err(e) => return Err(ApiError::IoError(e)),
        };

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Full::new(Bytes::from(contents)).boxed_unsync())?)
    }
}
