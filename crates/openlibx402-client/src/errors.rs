//! Payer-side error type.
//!
//! Protocol failures keep their [`X402Error`] taxonomy codes; transport
//! failures pass through unchanged; local concerns (egress policy, header
//! assembly, lifecycle) get their own variants.

use openlibx402_core::X402Error;

/// Errors surfaced by the payer client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A protocol failure with a stable machine code.
    #[error(transparent)]
    Protocol(#[from] X402Error),

    /// A transport failure, forwarded unchanged.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The target URL could not be parsed.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The egress guard refused the target before any network I/O.
    #[error("Refusing egress to {url}: {reason}")]
    EgressBlocked { url: String, reason: String },

    /// The authorization could not be placed into an HTTP header.
    #[error("Failed to encode payment header")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The original request body is a stream and cannot be replayed.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,

    /// The client was closed; its signer and RPC handle are gone.
    #[error("Client is closed")]
    Closed,
}

impl ClientError {
    /// The protocol machine code, when this is a protocol failure.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ClientError::Protocol(e) => Some(e.code()),
            _ => None,
        }
    }
}

impl From<ClientError> for reqwest_middleware::Error {
    fn from(error: ClientError) -> Self {
        reqwest_middleware::Error::Middleware(error.into())
    }
}
