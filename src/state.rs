//! Application state shared across concurrent requests.
//!
//! Built once at startup and injected into the router -- the caches inside
//! [`FlightService`] are the only cross-request mutable state, and they are
//! reached through this handle, never through globals.

use crate::booking::FlightService;
use crate::web::auth::{AuthSettings, JwtOracle, TokenOracle};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub flights: FlightService,
    /// Verification side of the token gate.
    pub token_oracle: Arc<dyn TokenOracle>,
    /// Issuance side, used by the login/refresh endpoints.
    pub token_issuer: Arc<JwtOracle>,
    pub auth: AuthSettings,
    /// `"mock"` or `"http"`, for the status endpoint.
    pub provider_mode: &'static str,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        flights: FlightService,
        oracle: Arc<JwtOracle>,
        auth: AuthSettings,
        provider_mode: &'static str,
    ) -> Self {
        Self {
            flights,
            token_oracle: Arc::clone(&oracle) as Arc<dyn TokenOracle>,
            token_issuer: oracle,
            auth,
            provider_mode,
            started_at: Instant::now(),
        }
    }
}
