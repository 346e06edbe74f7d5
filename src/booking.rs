//! Search and booking flows over the cached provider data.
//!
//! All provider calls go through the retry engine. Booking creation is
//! gated by [`FlightService::validate_selection`], which only ever consults
//! the search-result cache -- what the user saw at search time is what they
//! book, for the life of the session.

use crate::cache::FlightCache;
use crate::provider::errors::ProviderError;
use crate::provider::models::{
    BookingConfirmation, BookingOrder, FareFamily, Passenger, Payment, RouteMap, SearchQuery,
    SearchResult, Selection, Station,
};
use crate::provider::FlightProvider;
use crate::retry::{Retryable, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// The search session is gone -- expired or evicted. The user must
    /// search again.
    #[error("search session {0} has expired")]
    SearchExpired(String),
    /// The session is live but no longer contains this flight.
    #[error("flight {0} is not part of this search session")]
    FlightNotFound(String),
    /// The flight exists but does not offer this fare family.
    #[error("fare family {0} is not offered on the selected flight")]
    FareNotFound(String),
    /// Origin/destination pair absent from the route map; checked before
    /// the provider's search endpoint is ever called.
    #[error("no route from {origin} to {destination}")]
    InvalidRoute { origin: String, destination: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl BookingError {
    /// Whether the underlying failure was transient. Selection/session
    /// errors are never retryable -- the client should re-search instead.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// The resilience layer between the API surface and the provider: cache in
/// front, retry engine around every outbound call.
///
/// Constructed once at startup and injected; clone-cheap.
#[derive(Clone)]
pub struct FlightService {
    provider: Arc<dyn FlightProvider>,
    cache: FlightCache,
    /// Policy for idempotent reads (route map, stations, search, booking
    /// lookup).
    retry: RetryPolicy,
    /// Booking creation is not idempotent; defaults to [`RetryPolicy::none`].
    booking_retry: RetryPolicy,
}

impl FlightService {
    pub fn new(provider: Arc<dyn FlightProvider>, cache: FlightCache, retry: RetryPolicy) -> Self {
        Self {
            provider,
            cache,
            retry,
            booking_retry: RetryPolicy::none(),
        }
    }

    pub fn cache(&self) -> &FlightCache {
        &self.cache
    }

    /// The route map, populated from the provider at most once per TTL
    /// window regardless of how many requests race on a cold cache.
    pub async fn route_map(&self) -> Result<Arc<RouteMap>, ProviderError> {
        let provider = Arc::clone(&self.provider);
        let retry = self.retry.clone();
        self.cache
            .route_map
            .get_or_populate((), move || async move {
                retry
                    .execute("route-map", || provider.get_route_map())
                    .await
            })
            .await
    }

    /// The station list, same population discipline as the route map.
    pub async fn stations(&self) -> Result<Arc<Vec<Station>>, ProviderError> {
        let provider = Arc::clone(&self.provider);
        let retry = self.retry.clone();
        self.cache
            .stations
            .get_or_populate((), move || async move {
                retry.execute("stations", || provider.get_stations()).await
            })
            .await
    }

    /// Search flights: route validity first (no provider call for a pair we
    /// do not fly), then the provider, then cache the result under its
    /// search id for later booking validation.
    pub async fn search(&self, query: SearchQuery) -> Result<Arc<SearchResult>, BookingError> {
        let route_map = self.route_map().await?;
        if !route_map.connects(&query.origin, &query.destination) {
            return Err(BookingError::InvalidRoute {
                origin: query.origin,
                destination: query.destination,
            });
        }

        let result = self
            .retry
            .execute("flight-search", || self.provider.search_flights(&query))
            .await?;

        debug!(
            search_id = %result.search_id,
            flights = result.flights.len(),
            "search result cached"
        );
        Ok(self.cache.searches.put(result.search_id.clone(), result))
    }

    /// Gate a booking attempt on the cached search session.
    ///
    /// Pure read over cache state -- no provider call, no cache mutation.
    /// The returned fare carries the price quoted at search time; the caller
    /// holds it in-process so expiry after this check cannot change what is
    /// charged.
    pub fn validate_selection(&self, selection: &Selection) -> Result<FareFamily, BookingError> {
        let session = self
            .cache
            .searches
            .get(&selection.search_id)
            .ok_or_else(|| BookingError::SearchExpired(selection.search_id.clone()))?;
        let flight = session
            .flight(&selection.flight_number)
            .ok_or_else(|| BookingError::FlightNotFound(selection.flight_number.clone()))?;
        let fare = flight
            .fare(&selection.fare_family_code)
            .ok_or_else(|| BookingError::FareNotFound(selection.fare_family_code.clone()))?;
        Ok(fare.clone())
    }

    /// Create a booking: validate the selection against the cached session,
    /// then place the order upstream. Validation failures fail fast -- the
    /// provider's booking endpoint is never touched for an expired or
    /// invalid selection.
    pub async fn create_booking(
        &self,
        selection: Selection,
        passengers: Vec<Passenger>,
        payment: Payment,
    ) -> Result<BookingConfirmation, BookingError> {
        let fare = self.validate_selection(&selection)?;
        let order = BookingOrder {
            selection,
            fare,
            passengers,
            payment,
        };

        let confirmation = self
            .booking_retry
            .execute("create-booking", || self.provider.create_booking(&order))
            .await?;
        info!(
            pnr = %confirmation.pnr,
            flight = %confirmation.flight_number,
            fare = %confirmation.fare_family_code,
            "booking created"
        );
        Ok(confirmation)
    }

    /// Look up an existing booking by PNR.
    pub async fn booking(&self, pnr: &str) -> Result<BookingConfirmation, BookingError> {
        self.retry
            .execute("booking-lookup", || self.provider.get_booking(pnr))
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::provider::models::Flight;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Provider double that counts calls and can be told to fail.
    #[derive(Default)]
    struct CountingProvider {
        route_map_calls: AtomicUsize,
        search_calls: AtomicUsize,
        booking_calls: AtomicUsize,
        fail_search_with: Option<u16>,
    }

    fn fares() -> Vec<FareFamily> {
        [("FLY", 19900), ("FLY_PLUS", 27900), ("FLY_MAX", 37900)]
            .into_iter()
            .map(|(code, price_minor)| FareFamily {
                code: code.into(),
                name: code.replace('_', " "),
                price_minor,
                currency: "SAR".into(),
            })
            .collect()
    }

    #[async_trait]
    impl FlightProvider for CountingProvider {
        async fn get_route_map(&self) -> Result<RouteMap, ProviderError> {
            self.route_map_calls.fetch_add(1, Ordering::SeqCst);
            let mut routes = HashMap::new();
            routes.insert("RUH".to_owned(), vec!["JED".to_owned()]);
            Ok(RouteMap { routes })
        }

        async fn get_stations(&self) -> Result<Vec<Station>, ProviderError> {
            Ok(Vec::new())
        }

        async fn search_flights(&self, query: &SearchQuery) -> Result<SearchResult, ProviderError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.fail_search_with {
                return Err(ProviderError::Status {
                    status,
                    url: "mock://search".into(),
                });
            }
            Ok(SearchResult {
                search_id: "S1".into(),
                flights: vec![Flight {
                    number: "FD100".into(),
                    origin: query.origin.clone(),
                    destination: query.destination.clone(),
                    departure: Utc::now(),
                    arrival: Utc::now(),
                    fares: fares(),
                }],
            })
        }

        async fn create_booking(
            &self,
            order: &BookingOrder,
        ) -> Result<BookingConfirmation, ProviderError> {
            self.booking_calls.fetch_add(1, Ordering::SeqCst);
            Ok(BookingConfirmation {
                pnr: "X4K9QZ".into(),
                flight_number: order.selection.flight_number.clone(),
                fare_family_code: order.fare.code.clone(),
                total_minor: order.fare.price_minor * order.passengers.len() as u64,
                currency: order.fare.currency.clone(),
                passengers: order.passengers.clone(),
                created_at: Utc::now(),
            })
        }

        async fn get_booking(&self, _pnr: &str) -> Result<BookingConfirmation, ProviderError> {
            Err(ProviderError::Status {
                status: 404,
                url: "mock://booking".into(),
            })
        }
    }

    fn service_with(provider: CountingProvider, search_ttl: Duration) -> FlightService {
        let settings = CacheSettings {
            search_ttl,
            ..CacheSettings::default()
        };
        FlightService::new(
            Arc::new(provider),
            FlightCache::new(&settings),
            RetryPolicy {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
        )
    }

    fn query() -> SearchQuery {
        SearchQuery {
            origin: "RUH".into(),
            destination: "JED".into(),
            date: Utc::now().date_naive(),
            passengers: 1,
        }
    }

    fn selection(search_id: &str, flight: &str, fare: &str) -> Selection {
        Selection {
            search_id: search_id.into(),
            flight_number: flight.into(),
            fare_family_code: fare.into(),
        }
    }

    fn passenger() -> Passenger {
        Passenger {
            first_name: "Sara".into(),
            last_name: "Alghamdi".into(),
            document_number: "P1234567".into(),
        }
    }

    fn payment() -> Payment {
        Payment {
            method: "card".into(),
            reference: "tok_demo".into(),
        }
    }

    #[tokio::test]
    async fn search_then_book_within_ttl() {
        let service = service_with(CountingProvider::default(), Duration::from_secs(300));
        let result = service.search(query()).await.unwrap();
        assert_eq!(result.search_id, "S1");

        let confirmation = service
            .create_booking(
                selection("S1", "FD100", "FLY_PLUS"),
                vec![passenger()],
                payment(),
            )
            .await
            .unwrap();
        assert_eq!(confirmation.pnr, "X4K9QZ");
        // Charged exactly the price quoted at search time.
        assert_eq!(confirmation.total_minor, 27900);
    }

    #[tokio::test]
    async fn booking_after_ttl_fails_with_search_expired() {
        let service = service_with(CountingProvider::default(), Duration::ZERO);
        service.search(query()).await.unwrap();

        let err = service
            .create_booking(
                selection("S1", "FD100", "FLY_PLUS"),
                vec![passenger()],
                payment(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SearchExpired(id) if id == "S1"));
    }

    #[tokio::test]
    async fn unknown_flight_fails_even_in_live_session() {
        let service = service_with(CountingProvider::default(), Duration::from_secs(300));
        service.search(query()).await.unwrap();

        let err = service
            .validate_selection(&selection("S1", "FD999", "FLY"))
            .unwrap_err();
        assert!(matches!(err, BookingError::FlightNotFound(n) if n == "FD999"));
    }

    #[tokio::test]
    async fn unknown_fare_fails_even_for_known_flight() {
        let service = service_with(CountingProvider::default(), Duration::from_secs(300));
        service.search(query()).await.unwrap();

        let err = service
            .validate_selection(&selection("S1", "FD100", "BUSINESS"))
            .unwrap_err();
        assert!(matches!(err, BookingError::FareNotFound(c) if c == "BUSINESS"));
    }

    #[tokio::test]
    async fn validation_never_calls_the_provider() {
        let provider = Arc::new(CountingProvider::default());
        let service = FlightService::new(
            Arc::clone(&provider) as Arc<dyn FlightProvider>,
            FlightCache::new(&CacheSettings::default()),
            RetryPolicy::none(),
        );
        service.search(query()).await.unwrap();
        let route_calls = provider.route_map_calls.load(Ordering::SeqCst);
        let search_calls = provider.search_calls.load(Ordering::SeqCst);

        let fare = service
            .validate_selection(&selection("S1", "FD100", "FLY"))
            .unwrap();
        assert_eq!(fare.price_minor, 19900);

        // Pure cache read: no provider traffic beyond the original search.
        assert_eq!(provider.route_map_calls.load(Ordering::SeqCst), route_calls);
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), search_calls);
        assert_eq!(provider.booking_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_validation_never_reaches_booking_endpoint() {
        let provider = Arc::new(CountingProvider::default());
        let settings = CacheSettings::default();
        let service = FlightService::new(
            Arc::clone(&provider) as Arc<dyn FlightProvider>,
            FlightCache::new(&settings),
            RetryPolicy::none(),
        );

        let err = service
            .create_booking(
                selection("NOPE", "FD100", "FLY"),
                vec![passenger()],
                payment(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SearchExpired(_)));
        assert_eq!(provider.booking_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_route_short_circuits_before_search() {
        let provider = Arc::new(CountingProvider::default());
        let service = FlightService::new(
            Arc::clone(&provider) as Arc<dyn FlightProvider>,
            FlightCache::new(&CacheSettings::default()),
            RetryPolicy::none(),
        );

        let err = service
            .search(SearchQuery {
                origin: "RUH".into(),
                destination: "AHB".into(),
                date: Utc::now().date_naive(),
                passengers: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidRoute { .. }));
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn route_map_is_cached_across_searches() {
        let provider = Arc::new(CountingProvider::default());
        let service = FlightService::new(
            Arc::clone(&provider) as Arc<dyn FlightProvider>,
            FlightCache::new(&CacheSettings::default()),
            RetryPolicy::none(),
        );

        service.search(query()).await.unwrap();
        service.search(query()).await.unwrap();
        assert_eq!(provider.route_map_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_search_failure_is_retried_then_surfaced() {
        let provider = Arc::new(CountingProvider {
            fail_search_with: Some(503),
            ..CountingProvider::default()
        });
        let service = FlightService::new(
            Arc::clone(&provider) as Arc<dyn FlightProvider>,
            FlightCache::new(&CacheSettings::default()),
            RetryPolicy {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
                jitter_factor: 0.0,
                ..RetryPolicy::default()
            },
        );

        let err = service.search(query()).await.unwrap_err();
        assert!(err.is_transient());
        // 1 initial + 2 retries
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_search_failure_is_not_retried() {
        let provider = Arc::new(CountingProvider {
            fail_search_with: Some(400),
            ..CountingProvider::default()
        });
        let service = FlightService::new(
            Arc::clone(&provider) as Arc<dyn FlightProvider>,
            FlightCache::new(&CacheSettings::default()),
            RetryPolicy::default(),
        );

        let err = service.search(query()).await.unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(provider.search_calls.load(Ordering::SeqCst), 1);
    }
}
