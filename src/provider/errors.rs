//! Error types for the flight-data provider clients.
//!
//! Retryability is a property of the error value, derived from the transport
//! kind or HTTP status code -- never from matching on message text.

use crate::retry::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection, DNS, TLS, or timeout failure -- no response arrived.
    #[error("transport failure calling {url}: {message}")]
    Transport {
        url: String,
        message: String,
        /// True when the failure was a client-side timeout.
        timeout: bool,
    },
    /// The provider replied with a non-success HTTP status.
    #[error("provider returned {status} for {url}")]
    Status { status: u16, url: String },
    /// The response arrived but its body did not match the expected shape.
    #[error("failed to parse provider response from {url}")]
    Parse {
        status: u16,
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ProviderError {
    /// Short stable label for logs and API error mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Parse { .. } => "parse",
        }
    }

    /// The upstream HTTP status, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { .. } => None,
            Self::Status { status, .. } | Self::Parse { status, .. } => Some(*status),
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            // The request may never have reached the provider; safe to repeat
            // for the idempotent calls this client wraps.
            Self::Transport { .. } => true,
            Self::Status { status, .. } => match status {
                // Rate limiting clears on its own.
                429 => true,
                // 501 is a permanent capability gap, unlike the rest of 5xx.
                501 => false,
                500..=599 => true,
                _ => false,
            },
            // A malformed body will be just as malformed on the next attempt.
            Self::Parse { .. } => false,
        }
    }
}
