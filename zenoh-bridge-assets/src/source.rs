//! Client for the upstream asset-location API.

use std::future::Future;

use reqwest::Client;
use thiserror::Error;
use uuid::Uuid;

use tracksight_common::AssetSnapshot;

/// Error fetching a snapshot. Recoverable; the cycle retries on the next
/// tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode asset response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Opaque fetch capability returning the current snapshot of tracked assets.
///
/// No retry, no caching; a failure propagates to the poll cycle.
pub trait AssetSource: Send + Sync {
    fn fetch(
        &self,
        credential: Uuid,
        location_id: i64,
    ) -> impl Future<Output = Result<AssetSnapshot, FetchError>> + Send;
}

/// HTTP client for the asset-location API.
#[derive(Clone)]
pub struct AssetApi {
    http: Client,
    base_url: String,
}

impl AssetApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn asset_endpoint(&self) -> String {
        format!("{}/asset", self.base_url)
    }
}

impl AssetSource for AssetApi {
    async fn fetch(
        &self,
        credential: Uuid,
        location_id: i64,
    ) -> Result<AssetSnapshot, FetchError> {
        let res = self
            .http
            .get(self.asset_endpoint())
            .query(&[
                ("apikey", credential.to_string()),
                ("locationid", location_id.to_string()),
            ])
            .send()
            .await?;

        if res.status().is_success() {
            res.json::<AssetSnapshot>().await.map_err(FetchError::Decode)
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(FetchError::Status { status, body })
        }
    }
}
