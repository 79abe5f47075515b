//! Asset polling and telemetry publishing.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tracksight_common::Format;

use crate::bus::{BusConnection, OutboundMessage};
use crate::config::RunConfig;
use crate::source::AssetSource;

/// Statistics from one publish batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublishStats {
    /// Number of successfully published messages.
    pub success: usize,
    /// Number of failed messages.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

/// The repeating poll/publish cycle.
///
/// Each tick fetches a fresh snapshot and publishes every record as its own
/// message. Failures are isolated per unit: a failed fetch skips one tick, a
/// failed publish skips one message. The loop carries no state across ticks,
/// so it always resumes from a clean fetch.
pub struct AssetPoller<S, B> {
    source: S,
    bus: Arc<B>,
    run: RunConfig,
    format: Format,
}

impl<S, B> AssetPoller<S, B>
where
    S: AssetSource,
    B: BusConnection,
{
    pub fn new(source: S, bus: Arc<B>, run: RunConfig, format: Format) -> Self {
        Self {
            source,
            bus,
            run,
            format,
        }
    }

    /// Run the polling loop until the token is cancelled.
    ///
    /// The first tick fires immediately; cancellation is observed at the top
    /// of each iteration and interrupts the inter-tick wait early. An
    /// in-flight tick is allowed to finish before the loop exits.
    pub async fn run(self, token: CancellationToken) {
        info!(
            location_id = self.run.location_id,
            interval_secs = self.run.poll_interval.as_secs(),
            "Starting asset poller"
        );

        loop {
            if token.is_cancelled() {
                break;
            }

            let stats = self.poll_once().await;
            debug!(
                published = stats.success,
                failed = stats.failed,
                "Tick complete"
            );

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.run.poll_interval) => {}
            }
        }

        info!("Asset poller stopped");
    }

    /// Perform a single poll cycle.
    async fn poll_once(&self) -> PublishStats {
        let mut stats = PublishStats::default();

        let snapshot = match self
            .source
            .fetch(self.run.credential, self.run.location_id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Asset fetch failed, retrying next tick");
                return stats;
            }
        };

        debug!(assets = snapshot.len(), "Fetched asset snapshot");

        for record in &snapshot {
            let message = match OutboundMessage::from_record(record, self.format) {
                Ok(message) => message,
                Err(e) => {
                    stats.failed += 1;
                    warn!(asset = %record.uid, error = %e, "Failed to build message");
                    continue;
                }
            };

            match self.bus.publish(&message).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(asset = %record.uid, error = %e, "Failed to publish asset");
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_stats_total() {
        let stats = PublishStats {
            success: 8,
            failed: 2,
        };
        assert_eq!(stats.total(), 10);
    }
}
