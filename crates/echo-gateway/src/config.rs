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

//! Configuration management for the HTTP gateway

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Resolved against the working directory
const DEFAULT_DOCS_FILE: &str = "docs/echo_service.swagger.json";

/// Configuration for the HTTP gateway
#[derive(Debug, Clone)]
pub struct Config {
    /// Host the HTTP listener binds to
    pub host: String,

    /// Port the HTTP listener binds to
    pub port: u16,

    /// `host:port` of the echo runtime
    pub rpc_endpoint: String,

    /// Reserved path serving the interface description document
    pub docs_path: String,

    /// File served verbatim at `docs_path`
    pub docs_file: Option<PathBuf>,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Deadline for unary calls and for the first message of a stream
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            rpc_endpoint: "127.0.0.1:50051".to_string(),
            docs_path: "/swagger".to_string(),
            docs_file: Some(PathBuf::from(DEFAULT_DOCS_FILE)),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("ECHO_GATEWAY_HOST") {
            config.host = host;
        }

        if let Some(port) = parse_env("ECHO_GATEWAY_PORT") {
            config.port = port;
        }

        if let Ok(endpoint) = env::var("ECHO_RPC_ENDPOINT") {
            config.rpc_endpoint = endpoint;
        }

        if let Ok(path) = env::var("ECHO_GATEWAY_DOCS_PATH") {
            config.docs_path = normalize_path(&path);
        }

        if let Ok(file) = env::var("ECHO_GATEWAY_DOCS_FILE") {
            config.docs_file = if file.trim().is_empty() { None } else { Some(PathBuf::from(file)) };
        }

        if let Some(max_body_size) = parse_env("ECHO_GATEWAY_MAX_BODY") {
            config.max_body_size = max_body_size;
        }

        if let Some(timeout) = parse_env::<u64>("ECHO_GATEWAY_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(timeout);
        }

        config
    }

    /// `host:port` the HTTP listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn with_rpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.rpc_endpoint = endpoint.into();
        self
    }

    pub fn with_docs_file(mut self, file: Option<PathBuf>) -> Self {
        self.docs_file = file;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') { path.to_string() } else { format!("/{}", path) }
}

fn parse_env<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring invalid {}={:?}: {}", key, raw, e);
            None
        }
    }
}
