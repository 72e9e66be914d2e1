//! Core types for the x402 payment protocol.
//!
//! x402 turns HTTP 402 "Payment Required" into an executable micropayment
//! handshake: a resource server answers an unpaid request with a
//! [`PaymentRequest`] challenge, the client settles it on-chain and retries
//! with a [`PaymentAuthorization`] header proving the payment.
//!
//! This crate holds everything both peers must agree on and nothing either
//! side keeps to itself:
//!
//! - [`models`] - the challenge/authorization wire model with JSON and
//!   base64url header codecs
//! - [`errors`] - the closed failure taxonomy with stable machine codes
//! - [`networks`] - the recognized Solana clusters and their RPC defaults
//! - [`util`] - header base64 codec and exact decimal amount math
//!
//! Chain settlement lives in `openlibx402-solana`, the payer client in
//! `openlibx402-client`, and the server-side gate in `openlibx402-axum`.

pub mod errors;
pub mod models;
pub mod networks;
pub mod util;

pub use errors::{X402Error, X402Result};
pub use models::{
    ASSET_TYPE_SPL, PAYMENT_AUTHORIZATION_HEADER, PaymentAuthorization, PaymentRequest,
};
pub use networks::SolanaNetwork;
pub use util::{MoneyAmount, TokenAmount};
