//! Web API router construction and handlers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::trace;

use crate::cache::SpaceStats;
use crate::provider::models::{Passenger, Payment, SearchQuery, Selection};
use crate::state::AppState;
use crate::web::auth::{self, Subject};
use crate::web::error::ApiError;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::middleware::security_headers::SecurityHeadersLayer;

/// Cache-Control presets for API endpoints.
pub mod cache_control {
    /// Route map and station list: slow-moving reference data.
    pub const REFERENCE: &str = "public, max-age=300, stale-while-revalidate=300";
    /// Search results and bookings are per-user; never shared.
    pub const PRIVATE: &str = "private, no-store";
}

/// Wraps a JSON response with a `Cache-Control` header.
fn with_cache_control<T: serde::Serialize>(value: T, header: &'static str) -> Response {
    let mut response = Json(value).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static(header),
    );
    response
}

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/routes", get(route_map))
        .route("/stations", get(stations))
        .route("/flights/search", get(search_flights))
        .route("/bookings", post(create_booking))
        .route("/bookings/{pnr}", get(get_booking))
        .route("/cache/stats", get(cache_stats))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .with_state(app_state.clone());

    Router::new()
        .nest("/api", api_router)
        .layer(axum::middleware::from_fn_with_state(
            app_state,
            auth::require_access_token,
        ))
        .layer(RequestIdLayer)
        .layer(SecurityHeadersLayer)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CompressionLayer::new())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    version: &'static str,
    commit: &'static str,
    provider: &'static str,
    uptime_seconds: u64,
}

/// Status endpoint showing build and provider information.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        provider: state.provider_mode,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// The route map, served from cache (one provider fetch per TTL window).
async fn route_map(State(state): State<AppState>) -> Result<Response, ApiError> {
    let map = state.flights.route_map().await?;
    Ok(with_cache_control(&*map, cache_control::REFERENCE))
}

/// The station list, served from cache.
async fn stations(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stations = state.flights.stations().await?;
    Ok(with_cache_control(&*stations, cache_control::REFERENCE))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    origin: String,
    destination: String,
    date: NaiveDate,
    #[serde(default = "default_passengers")]
    passengers: u32,
}

fn default_passengers() -> u32 {
    1
}

/// Search flights for a date and passenger count. The response carries a
/// `searchId` that a later booking must reference.
async fn search_flights(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let origin = params.origin.trim().to_ascii_uppercase();
    let destination = params.destination.trim().to_ascii_uppercase();
    if origin.len() != 3 || destination.len() != 3 {
        return Err(ApiError::bad_request(
            "origin and destination must be 3-letter station codes",
        ));
    }
    if !(1..=9).contains(&params.passengers) {
        return Err(ApiError::bad_request("passengers must be between 1 and 9"));
    }

    let result = state
        .flights
        .search(SearchQuery {
            origin,
            destination,
            date: params.date,
            passengers: params.passengers,
        })
        .await?;
    Ok(with_cache_control(&*result, cache_control::PRIVATE))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    search_id: String,
    flight_number: String,
    fare_family_code: String,
    passengers: Vec<Passenger>,
    payment: Payment,
}

/// Create a booking from a previously returned search result. Fails fast on
/// an expired search or invalid selection without touching the provider.
async fn create_booking(
    State(state): State<AppState>,
    Extension(Subject(subject)): Extension<Subject>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.passengers.is_empty() {
        return Err(ApiError::bad_request("at least one passenger is required"));
    }

    let confirmation = state
        .flights
        .create_booking(
            Selection {
                search_id: request.search_id,
                flight_number: request.flight_number,
                fare_family_code: request.fare_family_code,
            },
            request.passengers,
            request.payment,
        )
        .await?;
    trace!(subject = %subject, pnr = %confirmation.pnr, "booking confirmed");
    Ok((StatusCode::CREATED, Json(confirmation)))
}

/// Look up an existing booking by PNR.
async fn get_booking(
    State(state): State<AppState>,
    Path(pnr): Path<String>,
) -> Result<Response, ApiError> {
    let confirmation = state.flights.booking(&pnr).await.map_err(|err| {
        // A provider 404 means the PNR does not exist, not a gateway fault.
        if let crate::booking::BookingError::Provider(ref provider_err) = err
            && provider_err.status() == Some(404)
        {
            return ApiError::new(
                StatusCode::NOT_FOUND,
                crate::web::error::ApiErrorCode::NotFound,
                format!("no booking found for PNR {pnr}"),
            );
        }
        err.into()
    })?;
    Ok(with_cache_control(confirmation, cache_control::PRIVATE))
}

/// Cache monitoring snapshot. Protected; never affects behavior.
async fn cache_stats(State(state): State<AppState>) -> Json<Vec<SpaceStats>> {
    Json(state.flights.cache().stats())
}
