//! Wire model: [`PaymentRequest`] and [`PaymentAuthorization`].
//!
//! Both types serialize to the canonical snake_case JSON of the protocol.
//! Amounts stay decimal strings end-to-end; timestamps are ISO-8601 UTC.
//! The authorization additionally has a header form: base64 over its UTF-8
//! JSON, URL-safe alphabet on output, either alphabet accepted on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{X402Error, X402Result};
use crate::networks::SolanaNetwork;
use crate::util::Base64Bytes;

/// Asset type marker for SPL token payments.
pub const ASSET_TYPE_SPL: &str = "SPL";

/// Request header carrying the base64-encoded [`PaymentAuthorization`].
pub const PAYMENT_AUTHORIZATION_HEADER: &str = "X-Payment-Authorization";

/// Payment challenge sent by a gatekeeper in a 402 response body.
///
/// Immutable once emitted. The authoritative clock for `expires_at` is the
/// gatekeeper's.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRequest {
    /// Maximum amount required, as a decimal string in token UI units.
    pub max_amount_required: String,

    /// Asset family; `"SPL"` for the Solana binding.
    pub asset_type: String,

    /// Token mint address.
    pub asset_address: String,

    /// Recipient wallet address.
    pub payment_address: String,

    /// Cluster the payment must settle on.
    pub network: SolanaNetwork,

    /// Expiration timestamp (ISO-8601 UTC).
    pub expires_at: DateTime<Utc>,

    /// Opaque replay-window token, unique per challenge.
    pub nonce: String,

    /// Correlation key between this challenge and the authorization that
    /// satisfies it.
    pub payment_id: String,

    /// URI path being paid for. Echoed for display, not re-validated.
    pub resource: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PaymentRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_amount_required: impl Into<String>,
        asset_address: impl Into<String>,
        payment_address: impl Into<String>,
        network: SolanaNetwork,
        expires_at: DateTime<Utc>,
        nonce: impl Into<String>,
        payment_id: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            max_amount_required: max_amount_required.into(),
            asset_type: ASSET_TYPE_SPL.to_string(),
            asset_address: asset_address.into(),
            payment_address: payment_address.into(),
            network,
            expires_at,
            nonce: nonce.into(),
            payment_id: payment_id.into(),
            resource: resource.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True iff `now >= expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// [`Self::is_expired_at`] against the local clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Parses a challenge from its JSON body form.
    pub fn from_json(json: &str) -> X402Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Failed to parse payment request: {e}"))
        })
    }

    /// Serializes the challenge to its JSON body form.
    pub fn to_json(&self) -> X402Result<String> {
        serde_json::to_string(self).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Failed to serialize payment request: {e}"))
        })
    }

    /// Encodes the challenge as base64 JSON, for bindings that carry it in a
    /// header or an embedded field rather than the response body.
    pub fn to_base64(&self) -> X402Result<String> {
        Ok(Base64Bytes::encode(self.to_json()?).to_string())
    }

    /// Decodes a challenge from its base64 JSON form. Either base64 alphabet
    /// is accepted.
    pub fn from_base64(encoded: &str) -> X402Result<Self> {
        let decoded = Base64Bytes::from(encoded).decode().map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Invalid base64 payment request: {e}"))
        })?;
        let json = String::from_utf8(decoded).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Invalid UTF-8 in base64 data: {e}"))
        })?;
        Self::from_json(&json)
    }
}

/// Proof of settlement sent by a payer in the retry request.
///
/// Carried in the `X-Payment-Authorization` header. For the Solana binding,
/// `signature` and `transaction_hash` are the same transaction signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAuthorization {
    /// `payment_id` of the challenge this authorization satisfies.
    pub payment_id: String,

    /// Amount actually settled, as a decimal string; at least the
    /// challenge's `max_amount_required`.
    pub actual_amount: String,

    /// Must equal the challenge's `payment_address`.
    pub payment_address: String,

    /// Must equal the challenge's `asset_address`.
    pub asset_address: String,

    /// Must equal the challenge's `network`.
    pub network: SolanaNetwork,

    /// When the payer authorized the payment (ISO-8601 UTC).
    pub timestamp: DateTime<Utc>,

    /// Chain-native signature string.
    pub signature: String,

    /// Payer wallet address.
    pub public_key: String,

    /// Settled transaction identifier.
    pub transaction_hash: String,
}

impl PaymentAuthorization {
    pub fn new(
        payment_id: impl Into<String>,
        actual_amount: impl Into<String>,
        payment_address: impl Into<String>,
        asset_address: impl Into<String>,
        network: SolanaNetwork,
        signature: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        let signature = signature.into();
        Self {
            payment_id: payment_id.into(),
            actual_amount: actual_amount.into(),
            payment_address: payment_address.into(),
            asset_address: asset_address.into(),
            network,
            timestamp: Utc::now(),
            signature: signature.clone(),
            public_key: public_key.into(),
            transaction_hash: signature,
        }
    }

    pub fn from_json(json: &str) -> X402Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Failed to parse payment authorization: {e}"))
        })
    }

    pub fn to_json(&self) -> X402Result<String> {
        serde_json::to_string(self).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!(
                "Failed to serialize payment authorization: {e}"
            ))
        })
    }

    /// Encodes the authorization for the `X-Payment-Authorization` header.
    ///
    /// Emits URL-safe base64 with padding.
    pub fn to_header_value(&self) -> X402Result<String> {
        Ok(Base64Bytes::encode(self.to_json()?).to_string())
    }

    /// Decodes an authorization from a header value. Either base64 alphabet
    /// is accepted.
    pub fn from_header_value(encoded: &str) -> X402Result<Self> {
        let decoded = Base64Bytes::from(encoded).decode().map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Invalid base64 in header: {e}"))
        })?;
        let json = String::from_utf8(decoded).map_err(|e| {
            X402Error::InvalidPaymentRequest(format!("Invalid UTF-8 in header: {e}"))
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::Duration;

    fn request(expires_at: DateTime<Utc>) -> PaymentRequest {
        PaymentRequest::new(
            "0.10",
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
            SolanaNetwork::Devnet,
            expires_at,
            "nonce123",
            "payment123",
            "/api/premium-data",
        )
    }

    fn authorization() -> PaymentAuthorization {
        PaymentAuthorization::new(
            "payment123",
            "0.10",
            "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            SolanaNetwork::Devnet,
            "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW",
            "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
        )
    }

    #[test]
    fn request_round_trips() {
        let request = request(Utc::now() + Duration::seconds(300))
            .with_description("Access premium data");
        let json = request.to_json().unwrap();
        assert_eq!(PaymentRequest::from_json(&json).unwrap(), request);

        let encoded = request.to_base64().unwrap();
        assert_eq!(PaymentRequest::from_base64(&encoded).unwrap(), request);
    }

    #[test]
    fn wire_names_are_snake_case() {
        let request = request(Utc::now());
        let value: serde_json::Value =
            serde_json::from_str(&request.to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "max_amount_required",
            "asset_type",
            "asset_address",
            "payment_address",
            "network",
            "expires_at",
            "nonce",
            "payment_id",
            "resource",
        ] {
            assert!(object.contains_key(key), "missing wire field {key}");
        }
        // Optional description is omitted when unset
        assert!(!object.contains_key("description"));
        assert_eq!(object["asset_type"], "SPL");
        assert_eq!(object["network"], "solana-devnet");
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let err = PaymentRequest::from_json(r#"{"max_amount_required":"0.10"}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_REQUEST");
    }

    #[test]
    fn expiration_boundary() {
        let expires_at = Utc::now();
        let request = request(expires_at);
        assert!(!request.is_expired_at(expires_at - Duration::seconds(1)));
        // now == expires_at already counts as expired
        assert!(request.is_expired_at(expires_at));
        assert!(request.is_expired_at(expires_at + Duration::seconds(1)));
    }

    #[test]
    fn authorization_round_trips_through_header() {
        let auth = authorization();
        let header = auth.to_header_value().unwrap();
        assert_eq!(PaymentAuthorization::from_header_value(&header).unwrap(), auth);
    }

    #[test]
    fn header_accepts_standard_base64() {
        let auth = authorization();
        let standard = STANDARD.encode(auth.to_json().unwrap());
        assert_eq!(
            PaymentAuthorization::from_header_value(&standard).unwrap(),
            auth
        );
    }

    #[test]
    fn transaction_hash_mirrors_signature() {
        let auth = authorization();
        assert_eq!(auth.transaction_hash, auth.signature);
    }
}
