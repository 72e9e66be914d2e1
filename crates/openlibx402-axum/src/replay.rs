//! Optional replay defence: a store of issued challenges.
//!
//! The protocol does not mandate server-side challenge storage; a stateless
//! gate relies on field matching and on-chain verification alone. When a
//! store is attached, the gate additionally gains: correlation of each
//! authorization to the exact challenge it claims to satisfy (identity
//! fields byte-equal), expiry enforcement against the issued `expires_at`,
//! and single-use rejection of duplicate `payment_id` submissions.
//!
//! Entries live for the challenge TTL plus the skew allowance and are swept
//! on insertion.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use openlibx402_core::{PaymentAuthorization, PaymentRequest};

use crate::gate::{EXPIRY_SKEW_SECONDS, GateRejection};

struct IssuedChallenge {
    request: PaymentRequest,
    used: bool,
}

/// Map from `payment_id` to the challenge a gate issued for it.
#[derive(Default)]
pub struct ChallengeStore {
    entries: DashMap<String, IssuedChallenge>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly issued challenge and sweeps expired entries.
    pub fn record(&self, challenge: &PaymentRequest) {
        self.sweep(Utc::now());
        self.entries.insert(
            challenge.payment_id.clone(),
            IssuedChallenge {
                request: challenge.clone(),
                used: false,
            },
        );
    }

    /// Checks an authorization against the challenge it references.
    ///
    /// Does not consume the entry; call [`Self::consume`] after the full
    /// admission chain (including on-chain verification) has passed.
    pub fn validate(
        &self,
        authorization: &PaymentAuthorization,
        now: DateTime<Utc>,
    ) -> Result<(), GateRejection> {
        let entry = self.entries.get(&authorization.payment_id).ok_or_else(|| {
            GateRejection::VerificationFailed {
                message: format!(
                    "No issued challenge for payment_id {}",
                    authorization.payment_id
                ),
            }
        })?;

        if now >= entry.request.expires_at + Duration::seconds(EXPIRY_SKEW_SECONDS) {
            return Err(GateRejection::Expired);
        }
        if entry.used {
            return Err(GateRejection::VerificationFailed {
                message: "Authorization for this payment_id was already accepted".to_string(),
            });
        }

        let challenge = &entry.request;
        if authorization.payment_address != challenge.payment_address
            || authorization.asset_address != challenge.asset_address
            || authorization.network != challenge.network
        {
            return Err(GateRejection::VerificationFailed {
                message: "Authorization fields do not match the issued challenge".to_string(),
            });
        }
        Ok(())
    }

    /// Marks a challenge as satisfied. Returns false if it was already
    /// consumed by a concurrent submission.
    pub fn consume(&self, payment_id: &str) -> bool {
        match self.entries.get_mut(payment_id) {
            Some(mut entry) => {
                if entry.used {
                    false
                } else {
                    entry.used = true;
                    true
                }
            }
            None => false,
        }
    }

    fn sweep(&self, now: DateTime<Utc>) {
        let horizon = Duration::seconds(EXPIRY_SKEW_SECONDS);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now < entry.request.expires_at + horizon);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired challenges");
        }
    }
}
