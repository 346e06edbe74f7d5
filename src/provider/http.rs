//! HTTP client for a real flight-data provider.
//!
//! Failures are classified at the transport boundary into the structured
//! [`ProviderError`] variants the retry engine understands: connect/timeout
//! problems, non-success statuses, and body-shape mismatches.

use crate::provider::errors::ProviderError;
use crate::provider::json::parse_json_with_path;
use crate::provider::models::{
    BookingConfirmation, BookingOrder, RouteMap, SearchQuery, SearchResult, Station,
};
use crate::provider::FlightProvider;
use crate::utils::log_if_slow;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

/// Upstream calls slower than this get a warning log.
const SLOW_CALL_THRESHOLD: Duration = Duration::from_secs(2);

pub struct HttpFlightProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFlightProvider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let start = Instant::now();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| transport(&url, err))?;
        log_if_slow(start, SLOW_CALL_THRESHOLD, path);
        read_json(response, url).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| transport(&url, err))?;
        log_if_slow(start, SLOW_CALL_THRESHOLD, path);
        read_json(response, url).await
    }
}

fn transport(url: &str, err: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        url: url.to_owned(),
        timeout: err.is_timeout(),
        message: err.to_string(),
    }
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    url: String,
) -> Result<T, ProviderError> {
    let status = response.status().as_u16();
    if !response.status().is_success() {
        return Err(ProviderError::Status { status, url });
    }
    let body = response
        .text()
        .await
        .map_err(|err| transport(&url, err))?;
    parse_json_with_path(&body).map_err(|source| ProviderError::Parse {
        status,
        url,
        source,
    })
}

#[async_trait]
impl FlightProvider for HttpFlightProvider {
    async fn get_route_map(&self) -> Result<RouteMap, ProviderError> {
        self.get_json("/routes").await
    }

    async fn get_stations(&self) -> Result<Vec<Station>, ProviderError> {
        self.get_json("/stations").await
    }

    async fn search_flights(&self, query: &SearchQuery) -> Result<SearchResult, ProviderError> {
        self.post_json("/flights/search", query).await
    }

    async fn create_booking(
        &self,
        order: &BookingOrder,
    ) -> Result<BookingConfirmation, ProviderError> {
        self.post_json("/bookings", order).await
    }

    async fn get_booking(&self, pnr: &str) -> Result<BookingConfirmation, ProviderError> {
        self.get_json(&format!("/bookings/{pnr}")).await
    }
}
