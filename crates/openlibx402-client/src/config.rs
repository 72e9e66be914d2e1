//! Payer client configuration.

/// Options controlling the automatic detect-pay-retry flow.
#[derive(Debug, Clone)]
pub struct X402ClientConfig {
    /// Upper bound on settle-and-retry iterations.
    pub max_retries: u32,

    /// When false, a 402 is surfaced as `PAYMENT_REQUIRED` without settling.
    pub auto_retry: bool,

    /// Hard spending cap, as a decimal string in token UI units. A challenge
    /// requiring more is refused locally and no settlement is attempted.
    pub max_payment_amount: Option<String>,

    /// Opt-in to localhost/private-IP egress.
    pub allow_local: bool,

    /// Overrides the chain adapter's RPC endpoint.
    pub rpc_url: Option<String>,
}

impl Default for X402ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            auto_retry: true,
            max_payment_amount: None,
            allow_local: false,
            rpc_url: None,
        }
    }
}

impl X402ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    pub fn with_max_payment_amount(mut self, amount: impl Into<String>) -> Self {
        self.max_payment_amount = Some(amount.into());
        self
    }

    pub fn with_allow_local(mut self, allow_local: bool) -> Self {
        self.allow_local = allow_local;
        self
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let config = X402ClientConfig::default();
        assert_eq!(config.max_retries, 1);
        assert!(config.auto_retry);
        assert!(config.max_payment_amount.is_none());
        assert!(!config.allow_local);
        assert!(config.rpc_url.is_none());
    }
}
