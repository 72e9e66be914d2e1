//! Signer capability for payment transactions.
//!
//! The adapter is polymorphic over the pair {public key, sign}: a local
//! [`Keypair`] is the default implementation, and custodial wallets (remote
//! signing APIs) can implement the same trait without the payer state
//! machine ever touching key material.

use async_trait::async_trait;
use openlibx402_core::{X402Error, X402Result};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;

/// Capability object passed to the adapter for each sign-and-send.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// The wallet address that owns the source token account and pays fees.
    fn pubkey(&self) -> Pubkey;

    /// Signs `tx` against `recent_blockhash`.
    async fn sign_transaction(
        &self,
        tx: &mut Transaction,
        recent_blockhash: Hash,
    ) -> X402Result<()>;
}

#[async_trait]
impl TransactionSigner for Keypair {
    fn pubkey(&self) -> Pubkey {
        Signer::pubkey(self)
    }

    async fn sign_transaction(
        &self,
        tx: &mut Transaction,
        recent_blockhash: Hash,
    ) -> X402Result<()> {
        tx.try_sign(&[self], recent_blockhash).map_err(|e| {
            X402Error::TransactionBroadcastFailed(format!("Failed to sign transaction: {e}"))
        })
    }
}
