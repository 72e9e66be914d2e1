//! SPL-token settlement adapter.
//!
//! Everything that touches the chain lives here: associated-token-account
//! discovery and creation, transfer-checked construction, signing,
//! broadcast, on-chain verification, and balance lookups. Mint decimals are
//! always read from chain state, never hard-coded.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{UiTransactionEncoding, UiTransactionTokenBalance};
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account;
use spl_token::solana_program::program_pack::Pack;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use openlibx402_core::{
    MoneyAmount, PaymentAuthorization, PaymentRequest, SolanaNetwork, TokenAmount, X402Error,
    X402Result,
};

use crate::signer::TransactionSigner;

/// Chain adapter for SPL-token payments.
///
/// Owns the RPC handle exclusively; the payer core owns the adapter. The
/// signer is a capability passed in per [`SolanaPaymentAdapter::sign_and_send`],
/// so no key material is held here.
pub struct SolanaPaymentAdapter {
    rpc_client: Option<Arc<RpcClient>>,
    commitment: CommitmentConfig,
}

impl SolanaPaymentAdapter {
    /// Creates an adapter against an explicit RPC endpoint.
    pub fn new(rpc_url: impl Into<String>, commitment: Option<CommitmentConfig>) -> Self {
        let commitment = commitment.unwrap_or_else(CommitmentConfig::confirmed);
        Self {
            rpc_client: Some(Arc::new(RpcClient::new_with_commitment(
                rpc_url.into(),
                commitment,
            ))),
            commitment,
        }
    }

    /// Creates an adapter against a network's default public endpoint.
    pub fn for_network(network: SolanaNetwork) -> Self {
        Self::new(network.default_rpc_url(), None)
    }

    fn rpc(&self) -> X402Result<&RpcClient> {
        self.rpc_client
            .as_deref()
            .ok_or_else(|| X402Error::TransactionBroadcastFailed("adapter is closed".to_string()))
    }

    /// Releases the RPC handle. Idempotent; any later chain call fails.
    pub fn close(&mut self) {
        self.rpc_client.take();
    }

    /// Whether [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.rpc_client.is_none()
    }

    async fn fetch_mint_decimals(&self, mint: &Pubkey) -> X402Result<u8> {
        let account = self.rpc()?.get_account(mint).await.map_err(|e| {
            X402Error::TransactionBroadcastFailed(format!("Failed to fetch mint {mint}: {e}"))
        })?;
        let state = spl_token::state::Mint::unpack(&account.data).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Asset {mint} is not an SPL token mint: {e}"))
        })?;
        Ok(state.decimals)
    }

    /// Builds an unsigned transfer of `amount` to the challenge's recipient.
    ///
    /// Derives both associated token accounts, prepends an ATA-create
    /// instruction (rent paid by the payer) when the recipient's account does
    /// not exist yet, and appends a `transfer_checked` at the mint's decimals.
    /// The payer is the fee payer.
    pub async fn build_payment_transaction(
        &self,
        request: &PaymentRequest,
        amount: &MoneyAmount,
        payer: &Pubkey,
    ) -> X402Result<Transaction> {
        if request.is_expired() {
            return Err(X402Error::PaymentExpired {
                expires_at: request.expires_at,
            });
        }

        let token_mint = parse_pubkey(&request.asset_address, "token mint address")?;
        let recipient = parse_pubkey(&request.payment_address, "payment address")?;

        let decimals = self.fetch_mint_decimals(&token_mint).await?;
        self.build_transfer(amount, payer, &token_mint, &recipient, decimals)
            .await
    }

    async fn build_transfer(
        &self,
        amount: &MoneyAmount,
        payer: &Pubkey,
        token_mint: &Pubkey,
        recipient: &Pubkey,
        decimals: u8,
    ) -> X402Result<Transaction> {
        let units = amount
            .as_token_amount(decimals as u32)
            .map_err(|e| X402Error::InvalidPaymentRequest(format!("Invalid amount: {e}")))?;

        let sender_ata = get_associated_token_address(payer, token_mint);
        let recipient_ata = get_associated_token_address(recipient, token_mint);

        let mut instructions: Vec<Instruction> = Vec::new();
        if !self.account_exists(&recipient_ata).await? {
            debug!(%recipient_ata, "Recipient token account missing, prepending create");
            instructions.push(create_associated_token_account(
                payer,
                recipient,
                token_mint,
                &spl_token::id(),
            ));
        }

        instructions.push(
            spl_token::instruction::transfer_checked(
                &spl_token::id(),
                &sender_ata,
                token_mint,
                &recipient_ata,
                payer,
                &[],
                units.inner(),
                decimals,
            )
            .map_err(|e| {
                X402Error::TransactionBroadcastFailed(format!(
                    "Failed to create transfer instruction: {e}"
                ))
            })?,
        );

        let recent_blockhash = self.rpc()?.get_latest_blockhash().await.map_err(|e| {
            X402Error::TransactionBroadcastFailed(format!("Failed to get recent blockhash: {e}"))
        })?;

        debug!(amount = %amount, units = %units, decimals, "Built payment transaction");
        let message = Message::new_with_blockhash(&instructions, Some(payer), &recent_blockhash);
        Ok(Transaction::new_unsigned(message))
    }

    /// Signs `tx` with the given signer capability and submits it, waiting
    /// for confirmation at the adapter's commitment level.
    pub async fn sign_and_send(
        &self,
        mut tx: Transaction,
        signer: &dyn TransactionSigner,
    ) -> X402Result<Signature> {
        let recent_blockhash = tx.message.recent_blockhash;
        signer.sign_transaction(&mut tx, recent_blockhash).await?;

        let signature = self
            .rpc()?
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(|e| {
                X402Error::TransactionBroadcastFailed(format!(
                    "Failed to broadcast transaction: {e}"
                ))
            })?;
        info!(%signature, "Payment transaction confirmed");
        Ok(signature)
    }

    /// Runs the whole settlement pipeline for a challenge: expiry check,
    /// balance check, build, sign-and-send, and authorization construction.
    ///
    /// `amount` overrides the settled amount; it defaults to the challenge's
    /// `max_amount_required` and may not be below it.
    pub async fn create_payment(
        &self,
        request: &PaymentRequest,
        signer: &dyn TransactionSigner,
        amount: Option<&str>,
    ) -> X402Result<PaymentAuthorization> {
        if request.is_expired() {
            return Err(X402Error::PaymentExpired {
                expires_at: request.expires_at,
            });
        }

        let amount_str = amount.unwrap_or(&request.max_amount_required);
        let money = MoneyAmount::parse(amount_str)
            .map_err(|e| X402Error::InvalidPaymentRequest(format!("Invalid amount: {e}")))?;
        let required = MoneyAmount::parse(&request.max_amount_required).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Invalid max_amount_required: {e}"))
        })?;
        if money < required {
            return Err(X402Error::InvalidPaymentRequest(format!(
                "Amount {amount_str} is below the required {}",
                request.max_amount_required
            )));
        }

        let token_mint = parse_pubkey(&request.asset_address, "token mint address")?;
        let recipient = parse_pubkey(&request.payment_address, "payment address")?;
        let payer = signer.pubkey();

        let decimals = self.fetch_mint_decimals(&token_mint).await?;
        let units = money
            .as_token_amount(decimals as u32)
            .map_err(|e| X402Error::InvalidPaymentRequest(format!("Invalid amount: {e}")))?;

        let balance = self.token_balance_raw(&payer, &token_mint).await?;
        if balance < units {
            return Err(X402Error::InsufficientFunds {
                required_amount: amount_str.to_string(),
                available_amount: MoneyAmount::from_token_amount(balance, decimals as u32)
                    .to_string(),
            });
        }

        let tx = self
            .build_transfer(&money, &payer, &token_mint, &recipient, decimals)
            .await?;
        let signature = self.sign_and_send(tx, signer).await?;

        Ok(PaymentAuthorization::new(
            request.payment_id.clone(),
            amount_str,
            request.payment_address.clone(),
            request.asset_address.clone(),
            request.network,
            signature.to_string(),
            payer.to_string(),
        ))
    }

    /// Verifies a settled transaction against the expected payment facts.
    ///
    /// This is the full-strength check: the transaction must exist, have
    /// confirmed without error (`meta.err` null), and have credited the
    /// recipient's associated token account with at least `expected_amount`
    /// of `expected_mint`, judged by the transaction's pre/post token
    /// balances. Returns `Ok(false)` when the transaction confirmed but the
    /// credited amount, recipient, or mint does not match.
    pub async fn verify(
        &self,
        tx_hash: &str,
        expected_recipient: &str,
        expected_amount: &str,
        expected_mint: &str,
    ) -> X402Result<bool> {
        let signature = Signature::from_str(tx_hash).map_err(|e| {
            X402Error::PaymentVerificationFailed(format!("Invalid transaction signature: {e}"))
        })?;
        let expected = MoneyAmount::parse(expected_amount)
            .map_err(|e| X402Error::InvalidPaymentRequest(format!("Invalid amount: {e}")))?;

        let confirmed = self
            .rpc()?
            .get_transaction_with_config(
                &signature,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::JsonParsed),
                    commitment: Some(self.commitment),
                    max_supported_transaction_version: Some(0),
                },
            )
            .await
            .map_err(|e| {
                X402Error::PaymentVerificationFailed(format!("Failed to fetch transaction: {e}"))
            })?;

        let meta = confirmed.transaction.meta.ok_or_else(|| {
            X402Error::PaymentVerificationFailed("Transaction has no metadata".to_string())
        })?;
        if meta.err.is_some() {
            return Err(X402Error::PaymentVerificationFailed(
                "Transaction failed on-chain".to_string(),
            ));
        }

        let pre = token_balances(meta.pre_token_balances);
        let post = token_balances(meta.post_token_balances);

        let Some(post_entry) = find_balance(&post, expected_recipient, expected_mint) else {
            debug!(recipient = expected_recipient, mint = expected_mint,
                "No post-transaction balance for recipient, refusing");
            return Ok(false);
        };
        let decimals = post_entry.ui_token_amount.decimals as u32;
        let post_units = parse_units(&post_entry.ui_token_amount.amount)?;
        let pre_units = find_balance(&pre, expected_recipient, expected_mint)
            .map(|entry| parse_units(&entry.ui_token_amount.amount))
            .transpose()?
            .unwrap_or(0);

        let expected_units = expected
            .as_token_amount(decimals)
            .map_err(|e| X402Error::InvalidPaymentRequest(format!("Invalid amount: {e}")))?;
        let credited = post_units.saturating_sub(pre_units);

        debug!(credited, expected = expected_units.inner(), "Verified token balance delta");
        Ok(credited >= expected_units.inner() as u128)
    }

    /// Token balance of `wallet` for `mint` in UI units. A missing
    /// associated token account reads as zero.
    pub async fn get_token_balance(&self, wallet: &str, mint: &str) -> X402Result<MoneyAmount> {
        let wallet = parse_pubkey(wallet, "wallet address")?;
        let mint_key = parse_pubkey(mint, "token mint address")?;
        let decimals = self.fetch_mint_decimals(&mint_key).await?;
        let raw = self.token_balance_raw(&wallet, &mint_key).await?;
        Ok(MoneyAmount::from_token_amount(raw, decimals as u32))
    }

    async fn token_balance_raw(&self, wallet: &Pubkey, mint: &Pubkey) -> X402Result<TokenAmount> {
        let ata = get_associated_token_address(wallet, mint);
        match self.rpc()?.get_token_account_balance(&ata).await {
            Ok(balance) => {
                let units = balance.amount.parse::<u64>().map_err(|e| {
                    X402Error::TransactionBroadcastFailed(format!("Failed to parse balance: {e}"))
                })?;
                Ok(TokenAmount(units))
            }
            // No token account for this wallet/mint pair means a zero balance
            Err(e) if is_missing_account(&e.to_string()) => Ok(TokenAmount(0)),
            Err(e) => Err(X402Error::TransactionBroadcastFailed(format!(
                "Failed to get token balance: {e}"
            ))),
        }
    }

    async fn account_exists(&self, account: &Pubkey) -> X402Result<bool> {
        let accounts = self
            .rpc()?
            .get_multiple_accounts(&[*account])
            .await
            .map_err(|e| {
                X402Error::TransactionBroadcastFailed(format!(
                    "Failed to check account existence: {e}"
                ))
            })?;
        Ok(accounts.first().is_some_and(|a| a.is_some()))
    }
}

fn parse_pubkey(value: &str, what: &str) -> X402Result<Pubkey> {
    Pubkey::from_str(value)
        .map_err(|e| X402Error::InvalidPaymentRequest(format!("Invalid {what}: {e}")))
}

fn parse_units(amount: &str) -> X402Result<u128> {
    amount.parse::<u128>().map_err(|e| {
        X402Error::PaymentVerificationFailed(format!("Unparseable token balance: {e}"))
    })
}

fn token_balances(
    balances: OptionSerializer<Vec<UiTransactionTokenBalance>>,
) -> Vec<UiTransactionTokenBalance> {
    Option::from(balances).unwrap_or_default()
}

fn find_balance<'a>(
    balances: &'a [UiTransactionTokenBalance],
    owner: &str,
    mint: &str,
) -> Option<&'a UiTransactionTokenBalance> {
    balances.iter().find(|entry| {
        entry.mint == mint
            && Option::<String>::from(entry.owner.clone()).is_some_and(|o| o == owner)
    })
}

fn is_missing_account(message: &str) -> bool {
    message.contains("could not find account") || message.contains("AccountNotFound")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer;

    fn challenge(expires_in: i64) -> PaymentRequest {
        PaymentRequest::new(
            "0.10",
            spl_token::native_mint::id().to_string(),
            Pubkey::new_unique().to_string(),
            SolanaNetwork::Devnet,
            Utc::now() + Duration::seconds(expires_in),
            "nonce",
            "payment",
            "/premium",
        )
    }

    #[test]
    fn ata_derivation_is_deterministic() {
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let a = get_associated_token_address(&wallet, &mint);
        let b = get_associated_token_address(&wallet, &mint);
        assert_eq!(a, b);
        assert_ne!(a, get_associated_token_address(&wallet, &Pubkey::new_unique()));
    }

    #[tokio::test]
    async fn expired_challenge_never_builds() {
        let adapter = SolanaPaymentAdapter::for_network(SolanaNetwork::Devnet);
        let request = challenge(-1);
        let amount = MoneyAmount::parse("0.10").unwrap();
        let err = adapter
            .build_payment_transaction(&request, &amount, &Pubkey::new_unique())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PAYMENT_EXPIRED");
    }

    #[tokio::test]
    async fn expired_challenge_never_settles() {
        let adapter = SolanaPaymentAdapter::for_network(SolanaNetwork::Devnet);
        let keypair = Keypair::new();
        let err = adapter
            .create_payment(&challenge(-1), &keypair, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PAYMENT_EXPIRED");
    }

    #[tokio::test]
    async fn underpaying_the_challenge_is_rejected_before_io() {
        let adapter = SolanaPaymentAdapter::for_network(SolanaNetwork::Devnet);
        let keypair = Keypair::new();
        let err = adapter
            .create_payment(&challenge(300), &keypair, Some("0.01"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_REQUEST");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut adapter = SolanaPaymentAdapter::for_network(SolanaNetwork::Devnet);
        adapter.close();
        adapter.close();
        assert!(adapter.is_closed());

        let err = adapter
            .get_token_balance(
                &Pubkey::new_unique().to_string(),
                &Pubkey::new_unique().to_string(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TRANSACTION_BROADCAST_FAILED");
    }

    #[test]
    fn missing_account_detection() {
        assert!(is_missing_account("Invalid param: could not find account"));
        assert!(is_missing_account("AccountNotFound"));
        assert!(!is_missing_account("connection refused"));
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        assert!(parse_pubkey("not-a-pubkey", "wallet address").is_err());
        let keypair = Keypair::new();
        assert!(parse_pubkey(&Signer::pubkey(&keypair).to_string(), "wallet address").is_ok());
    }
}
