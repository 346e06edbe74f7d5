//! API error responses with stable machine-readable codes.
//!
//! Session/selection failures get their own codes so the client can prompt
//! "please search again" instead of showing a generic failure; exhausted
//! transient failures keep `retryable: true` so the client can offer a
//! "try again shortly" affordance.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::booking::BookingError;
use crate::provider::errors::ProviderError;
use crate::retry::Retryable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    SearchExpired,
    FlightNotFound,
    FareNotFound,
    InvalidRoute,
    /// Transient upstream failure, surfaced after retries were exhausted.
    UpstreamUnavailable,
    /// Upstream rate limit, surfaced after retries were exhausted.
    RateLimited,
    /// Upstream rejected the request permanently (4xx or unparseable body).
    UpstreamRejected,
    TokenMissing,
    TokenExpired,
    TokenInvalid,
    TokenWrongType,
    BadRequest,
    NotFound,
    Internal,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ApiErrorCode,
    pub message: String,
    /// Whether the underlying failure was transient -- kept on the response
    /// even though no further server-side attempts will be made.
    pub retryable: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retryable: false,
        }
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::Internal,
            message,
        )
    }

    pub fn token_missing() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiErrorCode::TokenMissing,
            "a bearer token is required",
        )
    }

    pub fn token_expired() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiErrorCode::TokenExpired,
            "the token has expired",
        )
    }

    pub fn token_invalid() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiErrorCode::TokenInvalid,
            "the token is not valid",
        )
    }

    pub fn token_wrong_type() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiErrorCode::TokenWrongType,
            "a different token type is required here",
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: ApiErrorCode,
    message: &'a str,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.code,
            message: &self.message,
            retryable: self.retryable,
        });
        (self.status, body).into_response()
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::SearchExpired(id) => Self::new(
                StatusCode::GONE,
                ApiErrorCode::SearchExpired,
                format!("search session {id} has expired, please search again"),
            ),
            BookingError::FlightNotFound(number) => Self::new(
                StatusCode::CONFLICT,
                ApiErrorCode::FlightNotFound,
                format!("flight {number} is no longer part of this search, please search again"),
            ),
            BookingError::FareNotFound(code) => Self::new(
                StatusCode::CONFLICT,
                ApiErrorCode::FareNotFound,
                format!("fare {code} is no longer offered on this flight, please search again"),
            ),
            BookingError::InvalidRoute {
                origin,
                destination,
            } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorCode::InvalidRoute,
                format!("no route from {origin} to {destination}"),
            ),
            BookingError::Provider(provider_err) => provider_err.into(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match &err {
            ProviderError::Status { status: 429, .. } => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                ApiErrorCode::RateLimited,
                "the flight provider is rate limiting us, try again shortly",
            )
            .retryable(),
            _ if err.is_retryable() => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorCode::UpstreamUnavailable,
                "the flight provider is unavailable, try again shortly",
            )
            .retryable(),
            _ => Self::new(
                StatusCode::BAD_GATEWAY,
                ApiErrorCode::UpstreamRejected,
                "the flight provider rejected the request",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_expired_maps_to_gone() {
        let api: ApiError = BookingError::SearchExpired("S1".into()).into();
        assert_eq!(api.status, StatusCode::GONE);
        assert_eq!(api.code, ApiErrorCode::SearchExpired);
        assert!(!api.retryable);
    }

    #[test]
    fn selection_errors_map_to_conflict() {
        let api: ApiError = BookingError::FlightNotFound("FD999".into()).into();
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, ApiErrorCode::FlightNotFound);

        let api: ApiError = BookingError::FareNotFound("BUSINESS".into()).into();
        assert_eq!(api.code, ApiErrorCode::FareNotFound);
    }

    #[test]
    fn exhausted_rate_limit_keeps_retryable_flag() {
        let api: ApiError = ProviderError::Status {
            status: 429,
            url: "mock://search".into(),
        }
        .into();
        assert_eq!(api.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(api.retryable);
    }

    #[test]
    fn transient_upstream_failure_is_service_unavailable() {
        let api: ApiError = ProviderError::Transport {
            url: "http://upstream/routes".into(),
            message: "timed out".into(),
            timeout: true,
        }
        .into();
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(api.retryable);
    }

    #[test]
    fn permanent_upstream_failure_is_bad_gateway() {
        let api: ApiError = ProviderError::Status {
            status: 400,
            url: "mock://search".into(),
        }
        .into();
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert!(!api.retryable);
    }
}
