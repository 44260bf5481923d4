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

use echo_runtime::shutdown::shutdown_on_interrupt;
use echo_runtime::{RuntimeConfig, RuntimeServer, ShutdownController};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RuntimeConfig::from_env();
    info!("Loaded configuration: bind_address={}, repeat_count={}", config.bind_address, config.repeat_count);

    // Wait for Ctrl + C to exit
    let controller = ShutdownController::new();
    tokio::spawn(shutdown_on_interrupt(controller.clone()));

    RuntimeServer::new(config).run(controller).await?;

    Ok(())
}
