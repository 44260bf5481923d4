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

use echo_gateway::{ApiServer, Config};
use echo_runtime::ShutdownController;
use echo_runtime::shutdown::shutdown_on_interrupt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting echo HTTP gateway");

    // Load configuration
    let config = Config::from_env();
    info!("Loaded configuration: bind_address={}, rpc_endpoint={}", config.bind_address(), config.rpc_endpoint);

    let controller = ShutdownController::new();
    tokio::spawn(shutdown_on_interrupt(controller.clone()));

    let server = ApiServer::new(config, controller.subscribe())?;
    server.run().await?;

    Ok(())
}
