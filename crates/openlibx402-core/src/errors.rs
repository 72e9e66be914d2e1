//! The closed failure taxonomy of the payment handshake.
//!
//! Every protocol failure maps to exactly one variant with a stable string
//! code, a retryability flag, and a suggested user action. The last two
//! variants carry implementation-local payer policy codes; they never appear
//! on the wire.

use chrono::{DateTime, Utc};

use crate::models::PaymentRequest;

/// Result alias used throughout the protocol crates.
pub type X402Result<T> = Result<T, X402Error>;

/// A protocol-level failure.
#[derive(Debug, thiserror::Error)]
pub enum X402Error {
    /// The server demands payment. Not strictly an error: an exceptional
    /// control-flow value carrying the challenge, raised only when the payer
    /// declines to settle automatically.
    #[error("Payment required: {} {} on {}", .0.max_amount_required, .0.asset_type, .0.network)]
    PaymentRequired(Box<PaymentRequest>),

    /// The challenge or authorization is past its `expires_at`.
    #[error("Payment request expired at {expires_at}")]
    PaymentExpired { expires_at: DateTime<Utc> },

    /// The payer wallet cannot cover the requested amount.
    #[error("Insufficient funds: {required_amount} required, {available_amount} available")]
    InsufficientFunds {
        required_amount: String,
        available_amount: String,
    },

    /// The transaction could not be verified on-chain, or its fields do not
    /// match the challenge.
    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    /// The chain adapter could not submit or confirm the transaction.
    #[error("Transaction broadcast failed: {0}")]
    TransactionBroadcastFailed(String),

    /// Malformed JSON/header or a missing required field.
    #[error("Invalid payment request: {0}")]
    InvalidPaymentRequest(String),

    /// Local payer policy: the challenge asks for more than the configured
    /// cap. Never settles. Not a wire code.
    #[error("Payment limit exceeded: {required_amount} requested, {limit} allowed")]
    PaymentLimitExceeded {
        required_amount: String,
        limit: String,
    },

    /// Local payer policy: the settle-and-retry budget ran out. Not a wire
    /// code.
    #[error("Maximum payment retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },
}

impl X402Error {
    /// The stable machine code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            X402Error::PaymentRequired(_) => "PAYMENT_REQUIRED",
            X402Error::PaymentExpired { .. } => "PAYMENT_EXPIRED",
            X402Error::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            X402Error::PaymentVerificationFailed(_) => "PAYMENT_VERIFICATION_FAILED",
            X402Error::TransactionBroadcastFailed(_) => "TRANSACTION_BROADCAST_FAILED",
            X402Error::InvalidPaymentRequest(_) => "INVALID_PAYMENT_REQUEST",
            X402Error::PaymentLimitExceeded { .. } => "PAYMENT_LIMIT_EXCEEDED",
            X402Error::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
        }
    }

    /// Whether retrying (possibly after a corrective step) can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            X402Error::PaymentRequired(_) => true,
            X402Error::PaymentExpired { .. } => true,
            X402Error::InsufficientFunds { .. } => false,
            X402Error::PaymentVerificationFailed(_) => true,
            X402Error::TransactionBroadcastFailed(_) => true,
            X402Error::InvalidPaymentRequest(_) => false,
            X402Error::PaymentLimitExceeded { .. } => false,
            X402Error::MaxRetriesExceeded { .. } => false,
        }
    }

    /// A short hint on what the caller can do about the failure.
    pub fn user_action(&self) -> &'static str {
        match self {
            X402Error::PaymentRequired(_) => "Settle the payment and retry with an authorization",
            X402Error::PaymentExpired { .. } => "Request a fresh challenge and retry",
            X402Error::InsufficientFunds { .. } => "Fund the payer wallet",
            X402Error::PaymentVerificationFailed(_) => {
                "Re-submit after a short delay, or fix the mismatched fields"
            }
            X402Error::TransactionBroadcastFailed(_) => "Retry the broadcast",
            X402Error::InvalidPaymentRequest(_) => "Fix the malformed request",
            X402Error::PaymentLimitExceeded { .. } => {
                "Raise the configured payment cap, or decline the resource"
            }
            X402Error::MaxRetriesExceeded { .. } => "Obtain a fresh challenge and start over",
        }
    }

    /// True for the codes that travel on the wire; the payer policy codes do
    /// not.
    pub fn is_wire_code(&self) -> bool {
        !matches!(
            self,
            X402Error::PaymentLimitExceeded { .. } | X402Error::MaxRetriesExceeded { .. }
        )
    }
}
