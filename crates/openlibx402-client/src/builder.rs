//! Builder glue for attaching [`X402Payments`] to a reqwest client.

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

use crate::middleware::X402Payments;

/// Adds x402 payment handling to a [`Client`] or [`ClientBuilder`].
///
/// ```rust,no_run
/// use openlibx402_client::{ReqwestWithPayments, ReqwestWithPaymentsBuild, X402Client, X402ClientConfig, X402Payments};
/// use openlibx402_core::SolanaNetwork;
/// use solana_sdk::signature::Keypair;
/// use reqwest::Client;
///
/// let payer = X402Client::new(Keypair::new(), SolanaNetwork::Devnet, X402ClientConfig::default());
/// let http = Client::new()
///     .with_payments(X402Payments::new(payer))
///     .build();
/// ```
pub trait ReqwestWithPayments<A> {
    /// Wraps the client or builder with the payment middleware.
    fn with_payments(self, payments: X402Payments) -> ReqwestWithPaymentsBuilder<A>;
}

impl ReqwestWithPayments<Client> for Client {
    fn with_payments(self, payments: X402Payments) -> ReqwestWithPaymentsBuilder<Client> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            payments,
        }
    }
}

impl ReqwestWithPayments<ClientBuilder> for ClientBuilder {
    fn with_payments(self, payments: X402Payments) -> ReqwestWithPaymentsBuilder<ClientBuilder> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            payments,
        }
    }
}

/// Intermediate builder produced by [`ReqwestWithPayments::with_payments`].
pub struct ReqwestWithPaymentsBuilder<A> {
    inner: A,
    payments: X402Payments,
}

/// Finishes a [`ReqwestWithPaymentsBuilder`] into a middleware-carrying client.
pub trait ReqwestWithPaymentsBuild {
    type BuildResult;
    type BuilderResult;

    /// Builds the client, consuming the builder.
    fn build(self) -> Self::BuildResult;

    /// Returns the underlying middleware client builder.
    fn builder(self) -> Self::BuilderResult;
}

impl ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<Client> {
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(self.payments)
    }
}

impl ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<ClientBuilder> {
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        Ok(self.builder()?.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.payments))
    }
}
