//! Clients for the upstream flight-data provider.
//!
//! The trait is the seam the resilience layer is built against: the HTTP
//! client talks to a real provider, the mock serves deterministic data for
//! development and tests. Both are slow-by-contract and fallible; callers
//! wrap every call in the retry engine.

pub mod errors;
pub mod http;
pub mod json;
pub mod mock;
pub mod models;

use async_trait::async_trait;
use errors::ProviderError;
use models::{
    BookingConfirmation, BookingOrder, RouteMap, SearchQuery, SearchResult, Station,
};

#[async_trait]
pub trait FlightProvider: Send + Sync {
    async fn get_route_map(&self) -> Result<RouteMap, ProviderError>;

    async fn get_stations(&self) -> Result<Vec<Station>, ProviderError>;

    async fn search_flights(&self, query: &SearchQuery) -> Result<SearchResult, ProviderError>;

    async fn create_booking(
        &self,
        order: &BookingOrder,
    ) -> Result<BookingConfirmation, ProviderError>;

    async fn get_booking(&self, pnr: &str) -> Result<BookingConfirmation, ProviderError>;
}
