//! Transparent 402 handling for `reqwest`.
//!
//! [`X402Payments`] is a `reqwest_middleware::Middleware`: any 402 response
//! is settled through the shared payer core and the request is retried once
//! with the resulting authorization header. The cap, expiry, and egress
//! policies of the wrapped [`X402Client`] apply unchanged.

use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::sync::Arc;
use tracing::{debug, info};

use openlibx402_core::models::PAYMENT_AUTHORIZATION_HEADER;

use crate::client::X402Client;
use crate::errors::ClientError;
use crate::guard;

/// Middleware that settles 402 challenges and retries with payment.
#[derive(Clone)]
pub struct X402Payments {
    client: Arc<X402Client>,
}

impl X402Payments {
    pub fn new(client: X402Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl From<X402Client> for X402Payments {
    fn from(client: X402Client) -> Self {
        X402Payments::new(client)
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for X402Payments {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        guard::check_url(req.url(), self.client.config().allow_local)
            .await
            .map_err(rqm::Error::from)?;

        let retry_req = req.try_clone();
        let res = next.clone().run(req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            debug!(status = ?res.status(), "No payment required, returning response");
            return Ok(res);
        }
        info!(url = ?res.url(), "Received 402 Payment Required, settling");

        let retry = async {
            let challenge = self.client.parse_payment_request(res).await?;
            let authorization = self.client.create_payment(&challenge, None).await?;
            let header = HeaderValue::from_str(&authorization.to_header_value()?)?;
            let mut retry = retry_req.ok_or(ClientError::RequestNotCloneable)?;
            retry
                .headers_mut()
                .insert(PAYMENT_AUTHORIZATION_HEADER, header);
            Ok::<Request, ClientError>(retry)
        }
        .await
        .map_err(rqm::Error::from)?;

        next.run(retry, extensions).await
    }
}
