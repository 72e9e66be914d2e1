//! Payer-side x402 client.
//!
//! Detects 402 Payment Required responses, settles the demanded SPL-token
//! payment on Solana, and retries the request with a signed
//! `X-Payment-Authorization` header.
//!
//! # Modes
//!
//! - **Explicit**: drive the handshake step by step with
//!   [`X402Client::get`]/[`X402Client::post`],
//!   [`X402Client::parse_payment_request`], and
//!   [`X402Client::create_payment`].
//! - **Automatic**: let [`X402Client::request_with_payment`] or the
//!   [`X402Payments`] reqwest middleware complete the cycle internally.
//!
//! # Safety rails
//!
//! Every outbound URL passes an egress guard (no loopback/private targets
//! unless opted in), a configurable spending cap refuses expensive
//! challenges before any chain interaction, and the settle-and-retry loop is
//! bounded by a retry budget.

pub mod builder;
pub mod client;
pub mod config;
pub mod errors;
pub mod guard;
pub mod middleware;

pub use builder::{ReqwestWithPayments, ReqwestWithPaymentsBuild, ReqwestWithPaymentsBuilder};
pub use client::X402Client;
pub use config::X402ClientConfig;
pub use errors::ClientError;
pub use middleware::X402Payments;
