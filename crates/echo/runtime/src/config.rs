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

//! Runtime configuration for the echo gRPC server and client

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::RpcError;

const DEFAULT_RPC_ENDPOINT: &str = "127.0.0.1:50051";

/// What `EchoClientStream` answers when the client sent nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyStreamPolicy {
    /// Answer with a message carrying the empty string
    #[default]
    EmptyMessage,
    /// Fail the call with `INVALID_ARGUMENT`
    Reject,
}

impl FromStr for EmptyStreamPolicy {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" | "empty_message" => Ok(Self::EmptyMessage),
            "reject" => Ok(Self::Reject),
            other => Err(RpcError::InvalidConfig {
                message: format!("unknown empty stream policy '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_address: SocketAddr,
    /// Copies `EchoServerStream` sends per request
    pub repeat_count: u32,
    /// Delay between two copies on `EchoServerStream`
    pub stream_interval: Duration,
    /// Outbound queue depth per streaming call
    pub stream_buffer_size: usize,
    pub empty_stream_policy: EmptyStreamPolicy,
    /// How long in-flight calls may drain after shutdown is requested
    pub shutdown_grace_period: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 50051)),
            repeat_count: 5,
            stream_interval: Duration::from_millis(1000),
            stream_buffer_size: 16,
            empty_stream_policy: EmptyStreamPolicy::EmptyMessage,
            shutdown_grace_period: Duration::from_millis(5000),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr_str) = std::env::var("ECHO_RPC_ENDPOINT") {
            match resolve_endpoint(&addr_str) {
                Some(addr) => config.bind_address = addr,
                None => warn!("Invalid ECHO_RPC_ENDPOINT '{}', using default {}", addr_str, config.bind_address),
            }
        }

        if let Some(count) = env_parse::<u32>("ECHO_REPEAT_COUNT") {
            config.repeat_count = count;
        }

        if let Some(interval) = env_parse::<u64>("ECHO_STREAM_INTERVAL_MS") {
            config.stream_interval = Duration::from_millis(interval);
        }

        if let Some(buffer) = env_parse::<usize>("ECHO_STREAM_BUFFER") {
            if buffer == 0 {
                warn!("ECHO_STREAM_BUFFER must be positive, using default {}", config.stream_buffer_size);
            } else {
                config.stream_buffer_size = buffer;
            }
        }

        if let Some(policy) = env_parse::<EmptyStreamPolicy>("ECHO_EMPTY_STREAM_POLICY") {
            config.empty_stream_policy = policy;
        }

        if let Some(grace) = env_parse::<u64>("ECHO_SHUTDOWN_GRACE_MS") {
            config.shutdown_grace_period = Duration::from_millis(grace);
        }

        config
    }

    pub fn with_bind_address(mut self, bind_address: SocketAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn with_repeat_count(mut self, repeat_count: u32) -> Self {
        self.repeat_count = repeat_count;
        self
    }

    pub fn with_stream_interval(mut self, stream_interval: Duration) -> Self {
        self.stream_interval = stream_interval;
        self
    }

    pub fn with_empty_stream_policy(mut self, policy: EmptyStreamPolicy) -> Self {
        self.empty_stream_policy = policy;
        self
    }
}

/// Client-side connection settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `http://host:port` URI of the echo runtime
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub stream_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoint_uri(DEFAULT_RPC_ENDPOINT),
            connect_timeout: Duration::from_millis(5000),
            stream_buffer_size: 16,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("ECHO_RPC_ENDPOINT") {
            config.endpoint = endpoint_uri(&endpoint);
        }

        if let Some(timeout) = env_parse::<u64>("ECHO_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(timeout);
        }

        config
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint_uri(endpoint);
        self
    }
}

/// Turn a `host:port` pair into the URI tonic dials; full URIs pass through
pub fn endpoint_uri(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

fn resolve_endpoint(endpoint: &str) -> Option<SocketAddr> {
    use std::net::ToSocketAddrs;

    let endpoint = endpoint.trim();
    let endpoint = endpoint.strip_prefix("http://").unwrap_or(endpoint);
    endpoint.to_socket_addrs().ok()?.next()
}

fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Invalid {} '{}': {}, using default", key, raw, e);
            None
        }
    }
}
