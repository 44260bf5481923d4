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

//! gRPC listener with signal-driven shutdown

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::error::RpcResult;
use crate::proto::echo_service_server::EchoServiceServer;
use crate::services::EchoServiceImpl;
use crate::shutdown::ShutdownController;

/// Echo gRPC server
pub struct RuntimeServer {
    config: RuntimeConfig,
}

impl RuntimeServer {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.config.bind_address
    }

    /// Bind the configured address and serve until `controller` fires
    pub async fn run(self, controller: ShutdownController) -> RpcResult<()> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        self.serve(listener, controller).await
    }

    /// Serve on an already bound listener.
    ///
    /// Once shutdown is requested the listener stops accepting, in-flight calls
    /// observe cancellation and get `shutdown_grace_period` to drain, then
    /// whatever remains is dropped. The listener is released on every path out.
    pub async fn serve(self, listener: TcpListener, controller: ShutdownController) -> RpcResult<()> {
        let local_addr = listener.local_addr()?;
        let shutdown = controller.subscribe();
        let grace_period = self.config.shutdown_grace_period;

        let service = EchoServiceImpl::new(self.config).with_shutdown(shutdown.clone());

        info!("Starting echo gRPC server on {}", local_addr);

        let stop_accepting = shutdown.clone();
        let serving = Server::builder()
            .add_service(EchoServiceServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                stop_accepting.wait().await;
                info!("Stopping the server");
            });
        tokio::pin!(serving);

        let drain_deadline = async {
            shutdown.wait().await;
            tokio::time::sleep(grace_period).await;
        };

        tokio::select! {
            result = &mut serving => result?,
            _ = drain_deadline => warn!("In-flight calls did not finish within {:?}, terminating them", grace_period),
        }

        info!("Closing the listener on {}", local_addr);
        Ok(())
    }
}
