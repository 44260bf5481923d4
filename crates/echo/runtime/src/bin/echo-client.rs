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

//! Drives every call shape of the echo service once against a running server

use std::time::Duration;

use echo_runtime::{ClientConfig, EchoClient, StringMessage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CLIENT_STREAM_MESSAGES: usize = 5;
const BIDI_VALUES: [&str; 3] = ["val1", "val2", "val3"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env();
    info!("Connecting to {}", config.endpoint);
    let client = EchoClient::connect(&config).await?;

    let response = client.echo(StringMessage::new("hello")).await?;
    info!("Echo returned {:?}", response.value);

    let mut call = client.echo_server_stream(StringMessage::new("stream"));
    while let Some(message) = call.recv().await? {
        info!("Server stream yielded {:?}", message.value);
    }

    let mut call = client.echo_client_stream();
    for i in 0..CLIENT_STREAM_MESSAGES {
        call.send(StringMessage::new(format!("msg{}", i))).await?;
    }
    let response = call.close_and_recv().await?;
    info!("Client stream returned {:?}", response.value);

    let call = client.echo_bidi_stream();
    let (_, received) = call
        .drive(
            |mut send| async move {
                for value in BIDI_VALUES {
                    if let Err(e) = send.send(StringMessage::new(value)).await {
                        warn!("Bidi send stopped: {}", e);
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                send.close_send();
                send
            },
            |mut recv| async move {
                let mut received = Vec::new();
                loop {
                    match recv.recv().await {
                        Ok(Some(message)) => {
                            info!("Bidi stream yielded {:?}", message.value);
                            received.push(message.value);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Bidi receive failed: {}", e);
                            break;
                        }
                    }
                }
                received
            },
        )
        .await?;
    info!("Bidi stream echoed {} messages", received.len());

    Ok(())
}
