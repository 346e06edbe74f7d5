//! Bearer-token gate in front of the protected API surface.
//!
//! The middleware only ever branches on a [`TokenVerdict`]; how tokens are
//! minted and checked lives behind the [`TokenOracle`] trait. The default
//! oracle is HS256 JWTs, but nothing downstream knows that. `Expired` and
//! `Invalid` produce distinct error codes so clients know whether a refresh
//! attempt is worthwhile.

use crate::state::AppState;
use crate::web::error::ApiError;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Paths served without a token: health/status, the public reference data
/// needed to render a search form, and the token endpoints themselves.
pub const PUBLIC_PATHS: &[&str] = &[
    "/api/health",
    "/api/status",
    "/api/routes",
    "/api/stations",
    "/api/auth/login",
    "/api/auth/refresh",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// The oracle's complete answer. The resilience layer owns no token state;
/// it only branches on this.
#[derive(Debug, Clone)]
pub enum TokenVerdict {
    Valid {
        subject: String,
        token_type: TokenType,
        expires_at: DateTime<Utc>,
    },
    Expired,
    Invalid,
}

pub trait TokenOracle: Send + Sync {
    fn verify(&self, token: &str) -> TokenVerdict;
}

/// Authenticated subject, attached to the request by the gate.
#[derive(Debug, Clone)]
pub struct Subject(pub String);

/// Access/refresh token lifetimes.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    typ: TokenType,
}

/// HS256 JWT implementation of the oracle, also used to mint the demo
/// login/refresh tokens.
pub struct JwtOracle {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtOracle {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // No leeway: an expired token is expired, which the gate reports
        // distinctly from an invalid one.
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(
        &self,
        subject: &str,
        token_type: TokenType,
        ttl: ChronoDuration,
    ) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_owned(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            typ: token_type,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }
}

impl TokenOracle for JwtOracle {
    fn verify(&self, token: &str) -> TokenVerdict {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => TokenVerdict::Valid {
                subject: data.claims.sub,
                token_type: data.claims.typ,
                expires_at: DateTime::from_timestamp(data.claims.exp, 0).unwrap_or_default(),
            },
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenVerdict::Expired,
                _ => TokenVerdict::Invalid,
            },
        }
    }
}

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Gate middleware: everything outside the public allow-list requires a
/// valid **access** token.
pub async fn require_access_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let Some(token) = bearer_token(&request) else {
        return ApiError::token_missing().into_response();
    };

    match state.token_oracle.verify(token) {
        TokenVerdict::Valid {
            subject,
            token_type: TokenType::Access,
            ..
        } => {
            request.extensions_mut().insert(Subject(subject));
            next.run(request).await
        }
        TokenVerdict::Valid { token_type, .. } => {
            debug!(?token_type, "non-access token presented to protected path");
            ApiError::token_wrong_type().into_response()
        }
        TokenVerdict::Expired => ApiError::token_expired().into_response(),
        TokenVerdict::Invalid => ApiError::token_invalid().into_response(),
    }
}

// -- Token endpoints --

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
}

fn issue_pair(state: &AppState, subject: &str) -> Result<axum::Json<TokenPair>, ApiError> {
    let access_ttl = ChronoDuration::from_std(state.auth.access_ttl)
        .map_err(|_| ApiError::bad_request("access token TTL out of range"))?;
    let refresh_ttl = ChronoDuration::from_std(state.auth.refresh_ttl)
        .map_err(|_| ApiError::bad_request("refresh token TTL out of range"))?;

    let issue = |token_type, ttl| {
        state
            .token_issuer
            .issue(subject, token_type, ttl)
            .map_err(|err| {
                tracing::error!(error = ?err, "token signing failed");
                ApiError::internal("could not issue tokens")
            })
    };

    Ok(axum::Json(TokenPair {
        access_token: issue(TokenType::Access, access_ttl)?,
        refresh_token: issue(TokenType::Refresh, refresh_ttl)?,
        token_type: "Bearer",
        expires_in: state.auth.access_ttl.as_secs(),
    }))
}

/// Demo login: credentials are not checked against a user store, only for
/// presence. Token issuance is the part under test here.
pub(super) async fn login(
    State(state): State<AppState>,
    axum::Json(request): axum::Json<LoginRequest>,
) -> Result<axum::Json<TokenPair>, ApiError> {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    debug!(username = %request.username, "demo login");
    issue_pair(&state, request.username.trim())
}

/// Exchange a live refresh token for a fresh pair.
pub(super) async fn refresh(
    State(state): State<AppState>,
    axum::Json(request): axum::Json<RefreshRequest>,
) -> Result<axum::Json<TokenPair>, ApiError> {
    match state.token_oracle.verify(&request.refresh_token) {
        TokenVerdict::Valid {
            subject,
            token_type: TokenType::Refresh,
            ..
        } => issue_pair(&state, &subject),
        TokenVerdict::Valid { .. } => Err(ApiError::token_wrong_type()),
        TokenVerdict::Expired => Err(ApiError::token_expired()),
        TokenVerdict::Invalid => Err(ApiError::token_invalid()),
    }
}
