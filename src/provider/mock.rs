//! Deterministic in-process flight-data provider.
//!
//! Serves a small Saudi domestic network with fixed schedules and fares, and
//! simulates upstream latency. Used when no provider base URL is configured,
//! and by the integration tests.

use crate::provider::errors::ProviderError;
use crate::provider::models::{
    BookingConfirmation, BookingOrder, FareFamily, Flight, RouteMap, SearchQuery, SearchResult,
    Station,
};
use crate::provider::FlightProvider;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use dashmap::DashMap;
use nanoid::nanoid;
use std::collections::HashMap;
use std::time::Duration;

const STATIONS: &[(&str, &str, &str)] = &[
    ("RUH", "King Khalid International", "Riyadh"),
    ("JED", "King Abdulaziz International", "Jeddah"),
    ("DMM", "King Fahd International", "Dammam"),
    ("MED", "Prince Mohammad bin Abdulaziz", "Medina"),
    ("AHB", "Abha International", "Abha"),
    ("TUU", "Tabuk Regional", "Tabuk"),
];

/// Symmetric city pairs with the base (FLY) fare in halalas.
const ROUTES: &[(&str, &str, u64)] = &[
    ("RUH", "JED", 19900),
    ("RUH", "DMM", 14900),
    ("RUH", "AHB", 22900),
    ("RUH", "TUU", 25900),
    ("JED", "MED", 12900),
    ("JED", "AHB", 17900),
    ("JED", "DMM", 24900),
];

/// Departure times for the three daily rotations.
const DEPARTURES: &[(u32, u32)] = &[(8, 0), (13, 30), (19, 15)];

/// PNR alphabet: uppercase alphanumerics minus lookalikes.
const PNR_ALPHABET: [char; 31] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L',
    'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Z',
];

pub struct MockFlightProvider {
    latency: Duration,
    bookings: DashMap<String, BookingConfirmation>,
}

impl MockFlightProvider {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            bookings: DashMap::new(),
        }
    }

    /// Zero-latency variant for tests.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Directed route lookup: `Some((route index, reverse))` when flown.
    fn route_index(origin: &str, destination: &str) -> Option<(usize, bool)> {
        ROUTES.iter().enumerate().find_map(|(i, (a, b, _))| {
            if *a == origin && *b == destination {
                Some((i, false))
            } else if *b == origin && *a == destination {
                Some((i, true))
            } else {
                None
            }
        })
    }
}

fn fares_for(base_minor: u64) -> Vec<FareFamily> {
    vec![
        FareFamily {
            code: "FLY".into(),
            name: "Fly".into(),
            price_minor: base_minor,
            currency: "SAR".into(),
        },
        FareFamily {
            code: "FLY_PLUS".into(),
            name: "Fly Plus".into(),
            price_minor: base_minor + 8000,
            currency: "SAR".into(),
        },
        FareFamily {
            code: "FLY_MAX".into(),
            name: "Fly Max".into(),
            price_minor: base_minor + 18000,
            currency: "SAR".into(),
        },
    ]
}

fn departure_at(query: &SearchQuery, hour: u32, minute: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&query.date.and_time(time))
}

#[async_trait]
impl FlightProvider for MockFlightProvider {
    async fn get_route_map(&self) -> Result<RouteMap, ProviderError> {
        self.simulate_latency().await;
        let mut routes: HashMap<String, Vec<String>> = HashMap::new();
        for (a, b, _) in ROUTES {
            routes.entry((*a).to_owned()).or_default().push((*b).to_owned());
            routes.entry((*b).to_owned()).or_default().push((*a).to_owned());
        }
        Ok(RouteMap { routes })
    }

    async fn get_stations(&self) -> Result<Vec<Station>, ProviderError> {
        self.simulate_latency().await;
        Ok(STATIONS
            .iter()
            .map(|(code, name, city)| Station {
                code: (*code).to_owned(),
                name: (*name).to_owned(),
                city: (*city).to_owned(),
            })
            .collect())
    }

    async fn search_flights(&self, query: &SearchQuery) -> Result<SearchResult, ProviderError> {
        self.simulate_latency().await;
        let Some((route, reverse)) = Self::route_index(&query.origin, &query.destination) else {
            return Err(ProviderError::Status {
                status: 404,
                url: "mock://flights/search".into(),
            });
        };

        let (_, _, base_minor) = ROUTES[route];
        let flights = DEPARTURES
            .iter()
            .enumerate()
            .map(|(rotation, (hour, minute))| {
                // Even numbers outbound, odd inbound: RUH→JED is FD100/102/104.
                let number = 100 + route * 20 + rotation * 2 + usize::from(reverse);
                let departure = departure_at(query, *hour, *minute);
                Flight {
                    number: format!("FD{number}"),
                    origin: query.origin.clone(),
                    destination: query.destination.clone(),
                    departure,
                    arrival: departure + chrono::Duration::minutes(95),
                    fares: fares_for(base_minor),
                }
            })
            .collect();

        Ok(SearchResult {
            search_id: nanoid!(),
            flights,
        })
    }

    async fn create_booking(
        &self,
        order: &BookingOrder,
    ) -> Result<BookingConfirmation, ProviderError> {
        self.simulate_latency().await;
        let confirmation = BookingConfirmation {
            pnr: nanoid!(6, &PNR_ALPHABET),
            flight_number: order.selection.flight_number.clone(),
            fare_family_code: order.fare.code.clone(),
            total_minor: order.fare.price_minor * order.passengers.len() as u64,
            currency: order.fare.currency.clone(),
            passengers: order.passengers.clone(),
            created_at: Utc::now(),
        };
        self.bookings
            .insert(confirmation.pnr.clone(), confirmation.clone());
        Ok(confirmation)
    }

    async fn get_booking(&self, pnr: &str) -> Result<BookingConfirmation, ProviderError> {
        self.simulate_latency().await;
        self.bookings
            .get(pnr)
            .map(|entry| entry.clone())
            .ok_or_else(|| ProviderError::Status {
                status: 404,
                url: format!("mock://bookings/{pnr}"),
            })
    }
}
