//! HTTP client for the place directory service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ApiError, RemoteSource};
use crate::config::Config;
use crate::models::{Place, PlaceId};

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn countries_url(&self) -> String {
        format!("{}/countries", self.base_url)
    }

    fn states_url(&self, country_id: PlaceId) -> String {
        format!("{}/countries/{}/states", self.base_url, country_id)
    }

    fn cities_url(&self, state_id: PlaceId) -> String {
        format!("{}/states/{}/cities", self.base_url, state_id)
    }

    /// Ok(Some) on success, Ok(None) when rate limited, Err otherwise.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(Some(response))
        } else if status.as_u16() == 429 {
            Ok(None)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .header(header::ACCEPT, "application/json")
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", url, e))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_countries(&self) -> Result<Vec<Place>, ApiError> {
        let places: Vec<Place> = self.get(&self.countries_url()).await?;
        debug!(count = places.len(), "Countries fetched");
        Ok(places)
    }

    async fn fetch_states(&self, country_id: PlaceId) -> Result<Vec<Place>, ApiError> {
        let places: Vec<Place> = self.get(&self.states_url(country_id)).await?;
        debug!(country_id, count = places.len(), "States fetched");
        Ok(places)
    }

    async fn fetch_cities(&self, state_id: PlaceId) -> Result<Vec<Place>, ApiError> {
        let places: Vec<Place> = self.get(&self.cities_url(state_id)).await?;
        debug!(state_id, count = places.len(), "Cities fetched");
        Ok(places)
    }
}
