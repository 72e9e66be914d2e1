//! Axum middleware for enforcing x402 payments on protected routes.
//!
//! The gatekeeper half of the handshake: a [`X402Layer`] guards a route with
//! an [`X402Gate`] policy. Unpaid requests receive a `402 Payment Required`
//! challenge; paid requests are decoded, policy-checked, optionally verified
//! on-chain, and only then reach the handler, which can read the verified
//! [`PaymentAuthorization`](openlibx402_core::PaymentAuthorization) from
//! request extensions.
//!
//! Policies are per-route values: construct gates on the fly for tiered
//! pricing. Replay defence ([`ChallengeStore`]) is an optional layer on top;
//! the core admission chain never depends on it.

pub mod gate;
pub mod layer;
pub mod replay;

pub use gate::{GateRejection, X402Gate};
pub use layer::{X402GateService, X402Layer};
pub use replay::ChallengeStore;
