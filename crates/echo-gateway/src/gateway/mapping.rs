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

//! Route table mapping HTTP method + path to an echo operation

use echo_runtime::CallShape;
use hyper::Method;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fmt;

use crate::error::{ApiError, ApiResult};

/// RPC operations of the echo service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Echo,
    EchoServerStream,
    EchoClientStream,
    EchoBiDiStream,
}

impl Operation {
    pub fn shape(self) -> CallShape {
        match self {
            Operation::Echo => CallShape::Unary,
            Operation::EchoServerStream => CallShape::ServerStreaming,
            Operation::EchoClientStream => CallShape::ClientStreaming,
            Operation::EchoBiDiStream => CallShape::BidiStreaming,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Echo => "Echo",
            Operation::EchoServerStream => "EchoServerStream",
            Operation::EchoClientStream => "EchoClientStream",
            Operation::EchoBiDiStream => "EchoBiDiStream",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a route resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteBinding {
    pub operation: Operation,
    pub shape: CallShape,
}

impl RouteBinding {
    pub fn new(operation: Operation) -> Self {
        Self { operation, shape: operation.shape() }
    }
}

/// A matched route with its decoded path parameters
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub binding: RouteBinding,
    pub params: HashMap<String, String>,
}

/// Static mapping table; one router per HTTP method
pub struct RouteTable {
    routers: HashMap<Method, matchit::Router<RouteBinding>>,
}

impl RouteTable {
    pub fn empty() -> Self {
        Self { routers: HashMap::new() }
    }

    /// Routes of the echo service
    pub fn new() -> ApiResult<Self> {
        let mut table = Self::empty();
        table.add(Method::POST, "/v1/example/echo", Operation::Echo)?;
        table.add(Method::GET, "/v1/example/echo/{value}", Operation::Echo)?;
        table.add(Method::POST, "/v1/example/echo/stream", Operation::EchoServerStream)?;
        table.add(Method::GET, "/v1/example/echo/{value}/stream", Operation::EchoServerStream)?;
        table.add(Method::POST, "/v1/example/echo/client-stream", Operation::EchoClientStream)?;
        table.add(Method::POST, "/v1/example/echo/bidi", Operation::EchoBiDiStream)?;
        Ok(table)
    }

    pub fn add(&mut self, method: Method, path: &str, operation: Operation) -> ApiResult<()> {
        self.routers.entry(method).or_insert_with(matchit::Router::new).insert(path, RouteBinding::new(operation))?;
        Ok(())
    }

    /// Resolve a request.
    ///
    /// Fails with `NotFound` when no method knows the path and with
    /// `MethodNotAllowed` when only other methods do.
    pub fn resolve(&self, method: &Method, path: &str) -> ApiResult<ResolvedRoute> {
        if let Some(router) = self.routers.get(method) {
            if let Ok(matched) = router.at(path) {
                let mut params = HashMap::new();
                for (key, value) in matched.params.iter() {
                    let decoded = percent_decode_str(value).decode_utf8().map_err(|e| ApiError::BadRequest {
                        message: format!("Path parameter {} is not valid UTF-8: {}", key, e),
                    })?;
                    params.insert(key.to_string(), decoded.into_owned());
                }

                return Ok(ResolvedRoute { binding: *matched.value, params });
            }
        }

        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            return Err(ApiError::NotFound {
                message: format!("No route for {}", path),
            });
        }

        let allowed: Vec<&str> = allowed.iter().map(Method::as_str).collect();
        Err(ApiError::MethodNotAllowed {
            message: format!("{} {} (allowed: {})", method, path, allowed.join(", ")),
        })
    }

    /// Methods with a route matching `path`
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self.routers.iter().filter(|(_, router)| router.at(path).is_ok()).map(|(method, _)| method.clone()).collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}
