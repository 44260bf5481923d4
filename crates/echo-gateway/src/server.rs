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

//! HTTP server implementation using Hyper

use echo_runtime::{EchoClient, ShutdownSignal};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::router::Router;

/// Gateway server using Hyper
pub struct ApiServer {
    bind_address: SocketAddr,
    docs_path: String,
    router: Arc<Router>,
    shutdown: ShutdownSignal,
}

impl ApiServer {
    /// Create a new gateway server; the runtime is dialled on first use.
    ///
    /// Once `shutdown` fires the server stops accepting and every call still
    /// open towards the runtime is cancelled.
    pub fn new(config: Config, shutdown: ShutdownSignal) -> ApiResult<Self> {
        let bind_address: SocketAddr = config.bind_address().parse().map_err(|e| ApiError::InvalidConfig {
            message: format!("Invalid bind address {}: {}", config.bind_address(), e),
        })?;

        let client = EchoClient::connect_lazy(&config.rpc_endpoint)?.with_shutdown(shutdown.clone());
        let router = Arc::new(Router::new(&config, client)?);

        info!("Gateway created for echo runtime at {}", config.rpc_endpoint);

        Ok(Self {
            bind_address,
            docs_path: config.docs_path,
            router,
            shutdown,
        })
    }

    /// Get the bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self) -> ApiResult<()> {
        let listener = TcpListener::bind(self.bind_address).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown
    pub async fn serve(self, listener: TcpListener) -> ApiResult<()> {
        let local_addr = listener.local_addr()?;
        info!("Echo gateway listening on http://{}", local_addr);
        info!("Interface description available at http://{}{}", local_addr, self.docs_path);

        loop {
            let (stream, remote_addr) = tokio::select! {
                _ = self.shutdown.wait() => {
                    info!("Stopping the gateway");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let router = self.router.clone();

            // Spawn a task to handle the connection
            tokio::task::spawn(async move {
                if let Err(err) = serve_connection(stream, router).await {
                    error!("Error serving connection from {}: {}", remote_addr, err);
                }
            });
        }

        info!("Closing the gateway listener on {}", local_addr);
        Ok(())
    }
}

/// Serve HTTP/1 requests arriving on one connection
async fn serve_connection<I>(io: I, router: Arc<Router>) -> ApiResult<()>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let router = router.clone();
        async move { Ok::<_, Infallible>(router.handle(req).await) }
    });

    http1::Builder::new().serve_connection(TokioIo::new(io), service).await?;
    Ok(())
}
