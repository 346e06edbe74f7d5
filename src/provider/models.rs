//! Data shapes exchanged with the flight-data provider.
//!
//! Prices are carried in minor units (halalas for SAR) so the fare quoted at
//! search time can be compared and charged exactly, with no float drift.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An airport served by the airline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// IATA code, e.g. `RUH`.
    pub code: String,
    pub name: String,
    pub city: String,
}

/// The set of flyable origin→destination pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMap {
    /// origin code → destination codes reachable non-stop.
    pub routes: HashMap<String, Vec<String>>,
}

impl RouteMap {
    /// Whether the airline flies `origin` → `destination` non-stop.
    pub fn connects(&self, origin: &str, destination: &str) -> bool {
        self.routes
            .get(origin)
            .is_some_and(|dests| dests.iter().any(|d| d == destination))
    }
}

/// A named pricing/inclusion tier offered on a flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FareFamily {
    /// Stable code, e.g. `FLY_PLUS`.
    pub code: String,
    pub name: String,
    /// Price in minor currency units (e.g. halalas).
    pub price_minor: u64,
    pub currency: String,
}

/// One flight offered in a search result, with its available fares.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    /// Flight number, e.g. `FD100`.
    pub number: String,
    pub origin: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub fares: Vec<FareFamily>,
}

impl Flight {
    /// Look up a fare family offered on this flight by code.
    pub fn fare(&self, code: &str) -> Option<&FareFamily> {
        self.fares.iter().find(|f| f.code == code)
    }
}

/// Parameters of a flight search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    pub passengers: u32,
}

/// The full result set returned for one search call, referenced later by its
/// opaque `search_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub search_id: String,
    pub flights: Vec<Flight>,
}

impl SearchResult {
    /// Look up a flight in this result set by number.
    pub fn flight(&self, number: &str) -> Option<&Flight> {
        self.flights.iter().find(|f| f.number == number)
    }
}

/// A `(search, flight, fare)` triple submitted at booking time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub search_id: String,
    pub flight_number: String,
    pub fare_family_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    pub first_name: String,
    pub last_name: String,
    /// Travel document number; validated upstream, opaque here.
    pub document_number: String,
}

/// Opaque payment reference forwarded to the provider. Card handling lives
/// entirely upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub method: String,
    pub reference: String,
}

/// A booking order sent to the provider after the selection has been
/// validated against the cached search session. `fare` carries the price
/// quoted at search time; the provider charges exactly that.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingOrder {
    pub selection: Selection,
    pub fare: FareFamily,
    pub passengers: Vec<Passenger>,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    /// Passenger name record, e.g. `X4K9QZ`.
    pub pnr: String,
    pub flight_number: String,
    pub fare_family_code: String,
    /// Total charged in minor units: fare price × passenger count.
    pub total_minor: u64,
    pub currency: String,
    pub passengers: Vec<Passenger>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route_map() -> RouteMap {
        let mut routes = HashMap::new();
        routes.insert("RUH".to_owned(), vec!["JED".to_owned(), "DMM".to_owned()]);
        routes.insert("JED".to_owned(), vec!["RUH".to_owned()]);
        RouteMap { routes }
    }

    #[test]
    fn route_map_connects_known_pair() {
        let map = sample_route_map();
        assert!(map.connects("RUH", "JED"));
        assert!(map.connects("JED", "RUH"));
    }

    #[test]
    fn route_map_rejects_unknown_pair() {
        let map = sample_route_map();
        assert!(!map.connects("RUH", "AHB"));
        assert!(!map.connects("DMM", "RUH")); // one-way entry only
        assert!(!map.connects("XXX", "JED"));
    }

    #[test]
    fn flight_fare_lookup() {
        let flight = Flight {
            number: "FD100".into(),
            origin: "RUH".into(),
            destination: "JED".into(),
            departure: Utc::now(),
            arrival: Utc::now(),
            fares: vec![
                FareFamily {
                    code: "FLY".into(),
                    name: "Fly".into(),
                    price_minor: 19900,
                    currency: "SAR".into(),
                },
                FareFamily {
                    code: "FLY_PLUS".into(),
                    name: "Fly Plus".into(),
                    price_minor: 27900,
                    currency: "SAR".into(),
                },
            ],
        };
        assert_eq!(flight.fare("FLY_PLUS").map(|f| f.price_minor), Some(27900));
        assert!(flight.fare("FLY_MAX").is_none());
    }
}
