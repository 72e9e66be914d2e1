//! Axum middleware enforcing x402 payments on protected routes.
//!
//! Wraps an Axum service; requests without an `X-Payment-Authorization`
//! header receive a `402 Payment Required` challenge, requests with one go
//! through decode, policy checks, optional challenge correlation, and
//! optional on-chain verification before the inner handler runs. The
//! verified [`PaymentAuthorization`] is inserted into request extensions for
//! the handler.
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::{Extension, Json, Router, routing::get};
//! use openlibx402_axum::{X402Gate, X402Layer};
//! use openlibx402_core::{PaymentAuthorization, SolanaNetwork};
//! use serde_json::json;
//!
//! let gate = X402Gate::new(
//!     "0.10",
//!     "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
//!     "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
//!     SolanaNetwork::Devnet,
//!     true,
//! )
//! .with_description("Access to /premium");
//!
//! let app: Router = Router::new().route(
//!     "/premium",
//!     get(handler).layer(X402Layer::new(gate)),
//! );
//!
//! async fn handler(Extension(payment): Extension<PaymentAuthorization>) -> Json<serde_json::Value> {
//!     Json(json!({ "paid": payment.actual_amount }))
//! }
//! ```

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::StatusCode;
use http_body_util::BodyExt;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use tracing::{debug, info};

use openlibx402_core::models::PAYMENT_AUTHORIZATION_HEADER;
use openlibx402_core::{PaymentAuthorization, PaymentRequest};
use openlibx402_solana::SolanaPaymentAdapter;

use crate::gate::{GateRejection, X402Gate};
use crate::replay::ChallengeStore;

/// Middleware layer applying an [`X402Gate`] policy to a route.
#[derive(Clone)]
pub struct X402Layer {
    gate: Arc<X402Gate>,
    adapter: Option<Arc<SolanaPaymentAdapter>>,
    store: Option<Arc<ChallengeStore>>,
}

impl X402Layer {
    /// Creates a layer for a gate policy.
    ///
    /// When the gate has `auto_verify` set, a chain adapter is created
    /// against the gate's RPC endpoint (or the network default).
    pub fn new(gate: X402Gate) -> Self {
        let adapter = gate.auto_verify.then(|| {
            let rpc_url = gate
                .rpc_url
                .clone()
                .unwrap_or_else(|| gate.network.default_rpc_url().to_string());
            Arc::new(SolanaPaymentAdapter::new(rpc_url, None))
        });
        Self {
            gate: Arc::new(gate),
            adapter,
            store: None,
        }
    }

    /// Shares a pre-built adapter instead of creating one per layer.
    pub fn with_adapter(mut self, adapter: Arc<SolanaPaymentAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Attaches a challenge store, enabling replay defence and strict
    /// correlation of authorizations to the challenges this gate issued.
    pub fn with_replay_protection(mut self) -> Self {
        self.store = Some(Arc::new(ChallengeStore::new()));
        self
    }
}

impl<S> Layer<S> for X402Layer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = X402GateService;

    fn layer(&self, inner: S) -> Self::Service {
        X402GateService {
            gate: self.gate.clone(),
            adapter: self.adapter.clone(),
            store: self.store.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Wraps the inner Axum service with payment enforcement.
#[derive(Clone)]
pub struct X402GateService {
    gate: Arc<X402Gate>,
    adapter: Option<Arc<SolanaPaymentAdapter>>,
    store: Option<Arc<ChallengeStore>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl Service<Request> for X402GateService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = self.gate.clone();
        let adapter = self.adapter.clone();
        let store = self.store.clone();
        let inner = self.inner.clone();
        Box::pin(handle_request(gate, adapter, store, inner, req))
    }
}

async fn handle_request(
    gate: Arc<X402Gate>,
    adapter: Option<Arc<SolanaPaymentAdapter>>,
    store: Option<Arc<ChallengeStore>>,
    mut inner: BoxCloneSyncService<Request, Response, Infallible>,
    req: Request,
) -> Result<Response, Infallible> {
    let (mut req, authorization) = match extract_authorization(&gate, req).await {
        Ok(pair) => pair,
        Err(rejection) => return Ok(rejection_response(&rejection)),
    };

    let Some(authorization) = authorization else {
        let challenge = gate.build_challenge(req.uri().path());
        if let Some(store) = &store {
            store.record(&challenge);
        }
        info!(
            payment_id = %challenge.payment_id,
            resource = %challenge.resource,
            amount = %challenge.max_amount_required,
            "Emitting 402 challenge"
        );
        return Ok(challenge_response(&gate, &challenge));
    };

    if let Err(rejection) = gate.validate(&authorization) {
        debug!(code = rejection.code(), "Authorization failed policy checks");
        return Ok(rejection_response(&rejection));
    }

    if let Some(store) = &store
        && let Err(rejection) = store.validate(&authorization, chrono::Utc::now())
    {
        debug!(code = rejection.code(), "Authorization failed challenge correlation");
        return Ok(rejection_response(&rejection));
    }

    if gate.auto_verify {
        let Some(adapter) = &adapter else {
            return Ok(rejection_response(&GateRejection::VerificationFailed {
                message: "No chain adapter configured for verification".to_string(),
            }));
        };
        let verified = adapter
            .verify(
                &authorization.transaction_hash,
                &gate.payment_address,
                &authorization.actual_amount,
                &gate.token_mint,
            )
            .await;
        match verified {
            Ok(true) => {}
            Ok(false) => {
                return Ok(rejection_response(&GateRejection::VerificationFailed {
                    message: "On-chain transfer does not satisfy the payment".to_string(),
                }));
            }
            Err(e) => {
                return Ok(rejection_response(&GateRejection::VerificationFailed {
                    message: e.to_string(),
                }));
            }
        }
    }

    if let Some(store) = &store
        && !store.consume(&authorization.payment_id)
    {
        return Ok(rejection_response(&GateRejection::VerificationFailed {
            message: "Authorization for this payment_id was already accepted".to_string(),
        }));
    }

    info!(payment_id = %authorization.payment_id, "Payment admitted");
    req.extensions_mut().insert(authorization);
    inner.call(req).await
}

/// Pulls the authorization out of the header, or (when the legacy fallback
/// is enabled) out of a `payment_authorization` field in a JSON body. The
/// body is restored for the inner handler.
async fn extract_authorization(
    gate: &X402Gate,
    req: Request,
) -> Result<(Request, Option<PaymentAuthorization>), GateRejection> {
    if let Some(header) = req.headers().get(PAYMENT_AUTHORIZATION_HEADER) {
        let header = header.to_str().map_err(|_| GateRejection::Invalid {
            message: "Authorization header is not valid ASCII".to_string(),
        })?;
        let authorization =
            PaymentAuthorization::from_header_value(header).map_err(|e| {
                GateRejection::Invalid {
                    message: e.to_string(),
                }
            })?;
        return Ok((req, Some(authorization)));
    }

    if !gate.accept_body_authorization {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| GateRejection::Invalid {
            message: format!("Failed to read request body: {e}"),
        })?
        .to_bytes();
    let authorization = authorization_from_body(&bytes)?;
    let req = Request::from_parts(parts, Body::from(bytes));
    Ok((req, authorization))
}

fn authorization_from_body(
    bytes: &[u8],
) -> Result<Option<PaymentAuthorization>, GateRejection> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return Ok(None);
    };
    let Some(encoded) = value.get("payment_authorization").and_then(|v| v.as_str()) else {
        return Ok(None);
    };
    PaymentAuthorization::from_header_value(encoded)
        .map(Some)
        .map_err(|e| GateRejection::Invalid {
            message: e.to_string(),
        })
}

fn challenge_response(gate: &X402Gate, challenge: &PaymentRequest) -> Response {
    let body = serde_json::to_vec(challenge).expect("serialization failed");
    Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header("Content-Type", "application/json")
        .header("X-Payment-Required", "true")
        .header("X-Payment-Protocol", "x402")
        .header("X-Payment-Amount", gate.amount.as_str())
        .header("X-Payment-Asset", gate.token_mint.as_str())
        .body(Body::from(body))
        .expect("Fail to construct response")
}

fn rejection_response(rejection: &GateRejection) -> Response {
    let body = serde_json::to_vec(&rejection.body()).expect("serialization failed");
    Response::builder()
        .status(rejection.status())
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .expect("Fail to construct response")
}
