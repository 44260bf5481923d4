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

//! Process-wide shutdown broadcast and per-call cancellation
//!
//! A single [`ShutdownController`] is owned by the process. Every listener and
//! every in-flight call subscribes to it; requesting shutdown wakes all of them.
//! [`CallCancellation`] layers a per-call trigger on top, so closing one call
//! channel never touches its neighbours.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Owner side of the shutdown broadcast
#[derive(Debug, Clone)]
pub struct ShutdownController {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    /// Subscribe a new receiver; it observes a shutdown requested earlier
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Receiver side of the shutdown broadcast
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown is requested. Never resolves if the controller
    /// is dropped without requesting it.
    pub async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        let requested = receiver.wait_for(|flag| *flag).await.map(|_| ()).is_ok();
        if !requested {
            std::future::pending::<()>().await;
        }
    }
}

/// Cancellation shared by both halves of one call
#[derive(Debug, Clone)]
pub struct CallCancellation {
    local: ShutdownController,
    global: Option<ShutdownSignal>,
}

impl CallCancellation {
    pub fn new(global: Option<ShutdownSignal>) -> Self {
        Self {
            local: ShutdownController::new(),
            global,
        }
    }

    pub fn cancel(&self) {
        self.local.shutdown();
    }

    pub fn is_cancelled(&self) -> bool {
        self.local.is_shutdown() || self.global.as_ref().is_some_and(ShutdownSignal::is_shutdown)
    }

    /// Resolves when this call or the whole process is cancelled
    pub async fn cancelled(&self) {
        let local = self.local.subscribe();
        match &self.global {
            Some(global) => {
                tokio::select! {
                    _ = local.wait() => {}
                    _ = global.wait() => {}
                }
            }
            None => local.wait().await,
        }
    }
}

/// Wait for an interrupt and broadcast shutdown through `controller`
pub async fn shutdown_on_interrupt(controller: ShutdownController) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => warn!("Failed to listen for interrupt signal: {}", e),
    }
    controller.shutdown();
}
