//! The payer core.
//!
//! [`X402Client`] owns the HTTP client, the chain adapter, and the signer
//! capability. Two modes share the same machinery:
//!
//! - **Explicit mode**: the caller sees the 402 as data
//!   ([`X402Client::payment_required`], [`X402Client::parse_payment_request`])
//!   and drives settlement itself ([`X402Client::create_payment`]).
//! - **Automatic mode**: [`X402Client::request_with_payment`] completes the
//!   detect-pay-retry cycle internally, bounded by the configured retry
//!   budget and spending cap.
//!
//! A 402 response is a value, never an exception; `PAYMENT_REQUIRED` is only
//! raised when `auto_retry` is off and the caller asked for the automatic
//! flow, or when the retry budget runs out while the server still demands
//! payment.

use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use openlibx402_core::models::PAYMENT_AUTHORIZATION_HEADER;
use openlibx402_core::{
    MoneyAmount, PaymentAuthorization, PaymentRequest, SolanaNetwork, X402Error,
};
use openlibx402_solana::{SolanaPaymentAdapter, TransactionSigner};

use crate::config::X402ClientConfig;
use crate::errors::ClientError;
use crate::guard;

/// Payer-side client for x402-protected resources.
///
/// The client exclusively owns its adapter, the adapter exclusively owns the
/// RPC handle, and the signer is a capability handed to the adapter for each
/// settlement. [`X402Client::close`] releases all three; it is idempotent.
pub struct X402Client {
    http: Client,
    adapter: SolanaPaymentAdapter,
    signer: Option<Arc<dyn TransactionSigner>>,
    network: SolanaNetwork,
    config: X402ClientConfig,
}

impl X402Client {
    /// Creates a client paying on `network` with the given signer.
    pub fn new(
        signer: impl TransactionSigner + 'static,
        network: SolanaNetwork,
        config: X402ClientConfig,
    ) -> Self {
        let rpc_url = config
            .rpc_url
            .clone()
            .unwrap_or_else(|| network.default_rpc_url().to_string());
        Self {
            http: Client::new(),
            adapter: SolanaPaymentAdapter::new(rpc_url, None),
            signer: Some(Arc::new(signer)),
            network,
            config,
        }
    }

    pub fn config(&self) -> &X402ClientConfig {
        &self.config
    }

    /// Sends a request, optionally carrying a payment authorization header.
    ///
    /// Does not treat 402 as an error; the response is returned as-is. The
    /// egress guard runs before any socket is opened.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        authorization: Option<&PaymentAuthorization>,
    ) -> Result<Response, ClientError> {
        let url = Url::parse(url)?;
        guard::check_url(&url, self.config.allow_local).await?;

        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(authorization) = authorization {
            builder = builder.header(
                PAYMENT_AUTHORIZATION_HEADER,
                authorization.to_header_value()?,
            );
        }
        Ok(builder.send().await?)
    }

    pub async fn get(
        &self,
        url: &str,
        authorization: Option<&PaymentAuthorization>,
    ) -> Result<Response, ClientError> {
        self.request(Method::GET, url, None, authorization).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: Option<&Value>,
        authorization: Option<&PaymentAuthorization>,
    ) -> Result<Response, ClientError> {
        self.request(Method::POST, url, body, authorization).await
    }

    pub async fn put(
        &self,
        url: &str,
        body: Option<&Value>,
        authorization: Option<&PaymentAuthorization>,
    ) -> Result<Response, ClientError> {
        self.request(Method::PUT, url, body, authorization).await
    }

    pub async fn delete(
        &self,
        url: &str,
        authorization: Option<&PaymentAuthorization>,
    ) -> Result<Response, ClientError> {
        self.request(Method::DELETE, url, None, authorization).await
    }

    /// True iff the response is a 402 Payment Required.
    pub fn payment_required(response: &Response) -> bool {
        response.status() == StatusCode::PAYMENT_REQUIRED
    }

    /// Extracts the challenge from a 402 response body.
    ///
    /// Refuses challenges that are already expired on receipt.
    pub async fn parse_payment_request(
        &self,
        response: Response,
    ) -> Result<PaymentRequest, ClientError> {
        let bytes = response.bytes().await?;
        let request: PaymentRequest = serde_json::from_slice(&bytes).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Failed to parse payment request: {e}"))
        })?;
        if request.is_expired() {
            return Err(X402Error::PaymentExpired {
                expires_at: request.expires_at,
            }
            .into());
        }
        Ok(request)
    }

    /// Settles a challenge and returns the authorization for the retry.
    ///
    /// Enforces, in order and before any chain interaction: challenge
    /// expiry, network match, and the configured spending cap. A cap breach
    /// is a local policy error and never creates a transaction.
    pub async fn create_payment(
        &self,
        request: &PaymentRequest,
        amount: Option<&str>,
    ) -> Result<PaymentAuthorization, ClientError> {
        if request.is_expired() {
            return Err(X402Error::PaymentExpired {
                expires_at: request.expires_at,
            }
            .into());
        }
        if request.network != self.network {
            return Err(X402Error::InvalidPaymentRequest(format!(
                "Challenge is for {}, this client pays on {}",
                request.network, self.network
            ))
            .into());
        }
        self.assert_within_cap(amount.unwrap_or(&request.max_amount_required))?;

        let signer = self.signer.as_ref().ok_or(ClientError::Closed)?;
        let authorization = self
            .adapter
            .create_payment(request, signer.as_ref(), amount)
            .await?;
        info!(
            payment_id = %authorization.payment_id,
            signature = %authorization.signature,
            "Settled payment challenge"
        );
        Ok(authorization)
    }

    /// Performs a request with the full automatic detect-pay-retry cycle.
    ///
    /// Exactly one of success or failure is reached within
    /// `max_retries + 1` 402-settle cycles. A still-unpaid 402 after the
    /// budget runs out surfaces the last challenge as `PAYMENT_REQUIRED`;
    /// broadcast failures consume budget and end in `MAX_RETRIES_EXCEEDED`.
    pub async fn request_with_payment(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response, ClientError> {
        let mut budget = self.config.max_retries;
        let mut response = self.request(method.clone(), url, body, None).await?;

        loop {
            if !Self::payment_required(&response) {
                return Ok(response);
            }
            let challenge = self.parse_payment_request(response).await?;
            debug!(
                payment_id = %challenge.payment_id,
                amount = %challenge.max_amount_required,
                "Received 402 Payment Required"
            );

            if !self.config.auto_retry {
                return Err(X402Error::PaymentRequired(Box::new(challenge)).into());
            }
            if budget == 0 {
                return Err(X402Error::PaymentRequired(Box::new(challenge)).into());
            }
            budget -= 1;

            match self.create_payment(&challenge, None).await {
                Ok(authorization) => {
                    response = self
                        .request(method.clone(), url, body, Some(&authorization))
                        .await?;
                }
                Err(ClientError::Protocol(X402Error::TransactionBroadcastFailed(reason))) => {
                    if budget == 0 {
                        return Err(X402Error::MaxRetriesExceeded {
                            attempts: self.config.max_retries,
                        }
                        .into());
                    }
                    warn!(%reason, "Broadcast failed, requesting a fresh challenge");
                    response = self.request(method.clone(), url, body, None).await?;
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    fn assert_within_cap(&self, amount: &str) -> Result<(), ClientError> {
        let Some(cap) = &self.config.max_payment_amount else {
            return Ok(());
        };
        let cap_amount = MoneyAmount::parse(cap).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Invalid max_payment_amount: {e}"))
        })?;
        let requested = MoneyAmount::parse(amount)
            .map_err(|e| X402Error::InvalidPaymentRequest(format!("Invalid amount: {e}")))?;
        if requested > cap_amount {
            return Err(X402Error::PaymentLimitExceeded {
                required_amount: amount.to_string(),
                limit: cap.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Releases the signer and the RPC handle. Idempotent; later settlement
    /// attempts fail with [`ClientError::Closed`].
    pub fn close(&mut self) {
        self.signer.take();
        self.adapter.close();
    }

    /// Whether [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.signer.is_none() && self.adapter.is_closed()
    }
}
