//! Gate policy and request-time validation.
//!
//! [`X402Gate`] is the per-route payment policy: what a request costs, who
//! gets paid, in which asset, and whether the settlement is verified
//! on-chain before admission. [`GateRejection`] is the closed set of ways a
//! request can fail the gate, each mapping to exactly one HTTP status and
//! machine code.

use chrono::{Duration, Utc};
use uuid::Uuid;

use openlibx402_core::{MoneyAmount, PaymentAuthorization, PaymentRequest, SolanaNetwork};

/// Skew allowance applied to server-side expiry judgements.
pub(crate) const EXPIRY_SKEW_SECONDS: i64 = 5;

/// Payment policy for a protected route.
#[derive(Debug, Clone)]
pub struct X402Gate {
    /// Price of the resource, as a decimal string in token UI units.
    pub amount: String,
    /// Recipient wallet address.
    pub payment_address: String,
    /// SPL token mint the payment must use.
    pub token_mint: String,
    /// Cluster payments must settle on.
    pub network: SolanaNetwork,
    /// Human-readable description echoed in challenges.
    pub description: Option<String>,
    /// Challenge lifetime in seconds.
    pub expires_in: i64,
    /// Verify the settlement on-chain before admission.
    pub auto_verify: bool,
    /// RPC endpoint override for on-chain verification.
    pub rpc_url: Option<String>,
    /// Accept the legacy authorization-in-body fallback.
    pub accept_body_authorization: bool,
}

impl X402Gate {
    /// Creates a policy. `auto_verify` is a deliberate required argument:
    /// whether a gate trusts authorization fields or checks the chain is a
    /// decision, not a default.
    pub fn new(
        amount: impl Into<String>,
        payment_address: impl Into<String>,
        token_mint: impl Into<String>,
        network: SolanaNetwork,
        auto_verify: bool,
    ) -> Self {
        Self {
            amount: amount.into(),
            payment_address: payment_address.into(),
            token_mint: token_mint.into(),
            network,
            description: None,
            expires_in: 300,
            auto_verify,
            rpc_url: None,
            accept_body_authorization: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = seconds;
        self
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }

    pub fn with_accept_body_authorization(mut self, accept: bool) -> Self {
        self.accept_body_authorization = accept;
        self
    }

    /// Builds a fresh challenge for `resource` with new correlation tokens.
    pub fn build_challenge(&self, resource: &str) -> PaymentRequest {
        let expires_at = Utc::now() + Duration::seconds(self.expires_in);
        let mut challenge = PaymentRequest::new(
            self.amount.clone(),
            self.token_mint.clone(),
            self.payment_address.clone(),
            self.network,
            expires_at,
            Uuid::new_v4().to_string(),
            Uuid::new_v4().to_string(),
            resource,
        );
        if let Some(description) = &self.description {
            challenge = challenge.with_description(description.clone());
        }
        challenge
    }

    /// Runs the field-level policy checks against an authorization.
    ///
    /// Sufficiency is judged with exact decimal arithmetic; address and mint
    /// must byte-equal the policy.
    pub fn validate(&self, authorization: &PaymentAuthorization) -> Result<(), GateRejection> {
        let required = MoneyAmount::parse(&self.amount).map_err(|e| GateRejection::Invalid {
            message: format!("Gate amount is not a valid decimal: {e}"),
        })?;
        let provided = MoneyAmount::parse(&authorization.actual_amount).map_err(|e| {
            GateRejection::Invalid {
                message: format!("actual_amount is not a valid decimal: {e}"),
            }
        })?;
        if provided < required {
            return Err(GateRejection::InsufficientPayment {
                required: self.amount.clone(),
                provided: authorization.actual_amount.clone(),
            });
        }

        if authorization.payment_address != self.payment_address {
            return Err(GateRejection::AddressMismatch {
                expected: self.payment_address.clone(),
                provided: authorization.payment_address.clone(),
            });
        }
        if authorization.asset_address != self.token_mint {
            return Err(GateRejection::MintMismatch {
                expected: self.token_mint.clone(),
                provided: authorization.asset_address.clone(),
            });
        }
        if authorization.network != self.network {
            return Err(GateRejection::VerificationFailed {
                message: format!(
                    "Authorization is for {}, this gate settles on {}",
                    authorization.network, self.network
                ),
            });
        }
        Ok(())
    }
}

/// A request refused by the gate, with its HTTP mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    /// Malformed or undecodable authorization.
    Invalid { message: String },
    /// The authorization pays less than the policy demands.
    InsufficientPayment { required: String, provided: String },
    /// Recipient wallet differs from the policy's.
    AddressMismatch { expected: String, provided: String },
    /// Token mint differs from the policy's.
    MintMismatch { expected: String, provided: String },
    /// The originating challenge is past its expiry.
    Expired,
    /// On-chain or challenge-correlation verification failed.
    VerificationFailed { message: String },
}

impl GateRejection {
    pub fn status(&self) -> http::StatusCode {
        match self {
            GateRejection::Invalid { .. } => http::StatusCode::BAD_REQUEST,
            _ => http::StatusCode::FORBIDDEN,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GateRejection::Invalid { .. } => "INVALID_PAYMENT_REQUEST",
            GateRejection::InsufficientPayment { .. } => "INSUFFICIENT_PAYMENT",
            GateRejection::AddressMismatch { .. } => "PAYMENT_ADDRESS_MISMATCH",
            GateRejection::MintMismatch { .. } => "TOKEN_MINT_MISMATCH",
            GateRejection::Expired => "PAYMENT_EXPIRED",
            GateRejection::VerificationFailed { .. } => "PAYMENT_VERIFICATION_FAILED",
        }
    }

    /// The machine-readable JSON error body.
    pub fn body(&self) -> serde_json::Value {
        match self {
            GateRejection::Invalid { message } => serde_json::json!({
                "error": self.code(),
                "message": message,
            }),
            GateRejection::InsufficientPayment { required, provided } => serde_json::json!({
                "error": self.code(),
                "required": required,
                "provided": provided,
            }),
            GateRejection::AddressMismatch { expected, provided }
            | GateRejection::MintMismatch { expected, provided } => serde_json::json!({
                "error": self.code(),
                "expected": expected,
                "provided": provided,
            }),
            GateRejection::Expired => serde_json::json!({
                "error": self.code(),
                "message": "Payment authorization expired",
            }),
            GateRejection::VerificationFailed { message } => serde_json::json!({
                "error": self.code(),
                "message": message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> X402Gate {
        X402Gate::new(
            "0.10",
            "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            SolanaNetwork::Devnet,
            false,
        )
    }

    fn authorization(amount: &str) -> PaymentAuthorization {
        PaymentAuthorization::new(
            "payment-1",
            amount,
            "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            SolanaNetwork::Devnet,
            "sig",
            "payer",
        )
    }

    #[test]
    fn challenge_carries_policy_and_fresh_tokens() {
        let gate = gate().with_description("premium").with_expires_in(60);
        let a = gate.build_challenge("/premium");
        let b = gate.build_challenge("/premium");
        assert_eq!(a.max_amount_required, "0.10");
        assert_eq!(a.asset_address, gate.token_mint);
        assert_eq!(a.payment_address, gate.payment_address);
        assert_eq!(a.resource, "/premium");
        assert_eq!(a.description.as_deref(), Some("premium"));
        assert_ne!(a.payment_id, b.payment_id);
        assert_ne!(a.nonce, b.nonce);
        assert!(!a.is_expired());
    }

    #[test]
    fn sufficiency_is_decimal_exact() {
        let gate = gate();
        // "0.1" and "0.10" are the same value at every smallest-unit scale
        assert!(gate.validate(&authorization("0.1")).is_ok());
        assert!(gate.validate(&authorization("0.10")).is_ok());
        assert!(gate.validate(&authorization("0.100000001")).is_ok());

        let err = gate.validate(&authorization("0.099999999")).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_PAYMENT");
    }

    #[test]
    fn identity_fields_must_match() {
        let gate = gate();

        let mut auth = authorization("0.10");
        auth.payment_address = "someone-else".into();
        assert_eq!(
            gate.validate(&auth).unwrap_err().code(),
            "PAYMENT_ADDRESS_MISMATCH"
        );

        let mut auth = authorization("0.10");
        auth.asset_address = "other-mint".into();
        assert_eq!(
            gate.validate(&auth).unwrap_err().code(),
            "TOKEN_MINT_MISMATCH"
        );

        let mut auth = authorization("0.10");
        auth.network = SolanaNetwork::Mainnet;
        assert_eq!(
            gate.validate(&auth).unwrap_err().code(),
            "PAYMENT_VERIFICATION_FAILED"
        );
    }

    #[test]
    fn rejection_bodies_echo_amounts() {
        let rejection = GateRejection::InsufficientPayment {
            required: "0.10".into(),
            provided: "0.05".into(),
        };
        assert_eq!(rejection.status(), http::StatusCode::FORBIDDEN);
        let body = rejection.body();
        assert_eq!(body["error"], "INSUFFICIENT_PAYMENT");
        assert_eq!(body["required"], "0.10");
        assert_eq!(body["provided"], "0.05");
    }
}
