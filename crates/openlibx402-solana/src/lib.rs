//! Solana/SPL settlement for the x402 payment protocol.
//!
//! This crate is the chain-facing half of the handshake: given a
//! [`PaymentRequest`](openlibx402_core::PaymentRequest) challenge it builds,
//! signs, broadcasts, and verifies the SPL-token transfer that satisfies it.
//!
//! The adapter interface is stable across chain bindings; this SPL
//! implementation is the normative one. Key material stays behind the
//! [`TransactionSigner`] capability, so custodial signers can be slotted in
//! without touching the payer state machine.

pub mod adapter;
pub mod signer;

pub use adapter::SolanaPaymentAdapter;
pub use signer::TransactionSigner;
