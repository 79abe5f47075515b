//! Bridge lifecycle management.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusConnection, StatusHandler};
use crate::poller::AssetPoller;
use crate::source::AssetSource;
use crate::status::BridgeStatus;

/// Supervisor for the bridge.
///
/// Owns the single cancellation token shared by all components and wires the
/// shutdown triggers: an external termination request (SIGINT/SIGTERM) or the
/// bus reporting a terminal status. On either trigger the poller is allowed
/// to finish its in-flight tick, then the bus is closed and the process falls
/// through; recovery is the external supervising agent's restart policy.
pub struct BridgeRunner<B> {
    bus: Arc<B>,
    version: String,
    token: CancellationToken,
    poller: Option<JoinHandle<()>>,
}

impl<B> BridgeRunner<B>
where
    B: BusConnection + 'static,
{
    /// Create a runner around an open bus connection.
    pub fn new(bus: Arc<B>) -> Self {
        Self {
            bus,
            version: env!("CARGO_PKG_VERSION").to_string(),
            token: CancellationToken::new(),
            poller: None,
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register the status handler on the bus.
    ///
    /// Every transition is logged; a terminal reason cancels the token,
    /// beginning an orderly shutdown. Must be called before traffic flows.
    pub fn wire_status_handler(&self) {
        let token = self.token.clone();
        let handler: StatusHandler = Arc::new(move |status, reason| {
            tracing::info!(
                status = %status,
                reason = %reason,
                "Bus connection status changed"
            );

            if reason.is_terminal() && !token.is_cancelled() {
                tracing::warn!(
                    reason = %reason,
                    "Connection can not be re-established, shutting down"
                );
                token.cancel();
            }
        });

        self.bus.on_status_change(handler);
    }

    /// Spawn the poll/publish cycle.
    pub fn start<S>(&mut self, poller: AssetPoller<S, B>)
    where
        S: AssetSource + 'static,
    {
        let token = self.token.clone();
        self.poller = Some(tokio::spawn(poller.run(token)));
    }

    /// Run the bridge until cancellation, then shut down in order: await the
    /// poller, publish offline status, close the bus.
    pub async fn run(mut self) {
        if let Err(e) = self
            .bus
            .publish_status(&BridgeStatus::running(&self.version))
            .await
        {
            tracing::warn!(error = %e, "Failed to publish running status");
        }

        self.spawn_signal_watchers();

        tracing::info!("Bridge running");

        self.token.cancelled().await;

        tracing::info!("Shutting down");

        if let Some(poller) = self.poller.take() {
            if let Err(e) = poller.await {
                tracing::error!(error = %e, "Poller task failed");
            }
        }

        if let Err(e) = self
            .bus
            .publish_status(&BridgeStatus::offline(&self.version))
            .await
        {
            tracing::warn!(error = %e, "Failed to publish offline status");
        }

        if let Err(e) = self.bus.close().await {
            tracing::warn!(error = %e, "Error closing bus connection");
        }

        tracing::info!("Goodbye!");
    }

    /// Cancel the token on SIGINT or, on unix, SIGTERM.
    fn spawn_signal_watchers(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received shutdown signal");
                    token.cancel();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        #[cfg(unix)]
        {
            let token = self.token.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{SignalKind, signal};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        tracing::info!("Received SIGTERM");
                        token.cancel();
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to set up SIGTERM handler");
                    }
                }
            });
        }
    }
}
