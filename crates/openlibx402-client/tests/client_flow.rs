//! Payer state machine tests against a mock resource server.
//!
//! These cover every path of the automatic flow that does not require a live
//! chain: pass-through, surfacing challenges, cap refusal, expiry refusal,
//! egress blocking, and retry-budget exhaustion. The chain RPC endpoint
//! points at an unroutable local port, so any test that reaches the adapter
//! fails fast with a broadcast error, and any test asserting a local policy
//! error proves the chain was never needed.

use chrono::{Duration, Utc};
use reqwest::Method;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use openlibx402_client::{
    ClientError, ReqwestWithPayments, ReqwestWithPaymentsBuild, X402Client, X402ClientConfig,
    X402Payments,
};
use openlibx402_core::{PaymentRequest, SolanaNetwork, X402Error};

const UNREACHABLE_RPC: &str = "http://127.0.0.1:9/";

fn challenge(amount: &str, expires_in: i64) -> PaymentRequest {
    PaymentRequest::new(
        amount,
        Keypair::new().pubkey().to_string(),
        Keypair::new().pubkey().to_string(),
        SolanaNetwork::Devnet,
        Utc::now() + Duration::seconds(expires_in),
        "nonce-1",
        "payment-1",
        "/premium",
    )
}

fn client(config: X402ClientConfig) -> X402Client {
    let config = config.with_allow_local(true).with_rpc_url(UNREACHABLE_RPC);
    X402Client::new(Keypair::new(), SolanaNetwork::Devnet, config)
}

#[tokio::test]
async fn non_402_responses_pass_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(200).set_body_string("free"))
        .mount(&server)
        .await;

    let client = client(X402ClientConfig::default());
    let response = client
        .request_with_payment(Method::GET, &format!("{}/open", server.uri()), None)
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "free");
}

#[tokio::test]
async fn explicit_mode_exposes_the_challenge_as_data() {
    let server = MockServer::start().await;
    let issued = challenge("0.10", 300);
    Mock::given(method("GET"))
        .and(path("/premium"))
        .respond_with(ResponseTemplate::new(402).set_body_json(&issued))
        .mount(&server)
        .await;

    let client = client(X402ClientConfig::default());
    let response = client
        .get(&format!("{}/premium", server.uri()), None)
        .await
        .unwrap();
    assert!(X402Client::payment_required(&response));

    let parsed = client.parse_payment_request(response).await.unwrap();
    assert_eq!(parsed, issued);
}

#[tokio::test]
async fn auto_retry_disabled_surfaces_payment_required() {
    let server = MockServer::start().await;
    let issued = challenge("0.10", 300);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(402).set_body_json(&issued))
        .mount(&server)
        .await;

    let client = client(X402ClientConfig::default().with_auto_retry(false));
    let err = client
        .request_with_payment(Method::GET, &server.uri(), None)
        .await
        .unwrap_err();
    match err {
        ClientError::Protocol(X402Error::PaymentRequired(surfaced)) => {
            assert_eq!(surfaced.payment_id, issued.payment_id);
            assert_eq!(surfaced.max_amount_required, "0.10");
        }
        other => panic!("expected PAYMENT_REQUIRED, got {other:?}"),
    }
}

#[tokio::test]
async fn cap_breach_is_local_and_settles_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(402).set_body_json(&challenge("0.10", 300)))
        .mount(&server)
        .await;

    let client = client(X402ClientConfig::default().with_max_payment_amount("0.05"));
    let err = client
        .request_with_payment(Method::GET, &server.uri(), None)
        .await
        .unwrap_err();
    // A broadcast error would mean the adapter was consulted; the limit
    // error proves the refusal happened first.
    match err {
        ClientError::Protocol(X402Error::PaymentLimitExceeded {
            required_amount,
            limit,
        }) => {
            assert_eq!(required_amount, "0.10");
            assert_eq!(limit, "0.05");
        }
        other => panic!("expected PAYMENT_LIMIT_EXCEEDED, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_challenge_is_refused_on_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(402).set_body_json(&challenge("0.10", -5)))
        .mount(&server)
        .await;

    let client = client(X402ClientConfig::default());
    let err = client
        .request_with_payment(Method::GET, &server.uri(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("PAYMENT_EXPIRED"));
}

#[tokio::test]
async fn egress_guard_blocks_local_targets_before_io() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // allow_local stays false: the mock server's loopback address is refused
    let config = X402ClientConfig::default().with_rpc_url(UNREACHABLE_RPC);
    let client = X402Client::new(Keypair::new(), SolanaNetwork::Devnet, config);
    let err = client
        .request_with_payment(Method::GET, &server.uri(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::EgressBlocked { .. }));
}

#[tokio::test]
async fn broadcast_failures_exhaust_the_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(402).set_body_json(&challenge("0.10", 300)))
        .mount(&server)
        .await;

    // The RPC endpoint is unreachable, so every settlement attempt fails
    let client = client(X402ClientConfig::default().with_max_retries(1));
    let err = client
        .request_with_payment(Method::GET, &server.uri(), None)
        .await
        .unwrap_err();
    match err {
        ClientError::Protocol(X402Error::MaxRetriesExceeded { attempts }) => {
            assert_eq!(attempts, 1)
        }
        other => panic!("expected MAX_RETRIES_EXCEEDED, got {other:?}"),
    }
}

#[tokio::test]
async fn middleware_passes_through_and_enforces_the_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(200).set_body_string("free"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pricey"))
        .respond_with(ResponseTemplate::new(402).set_body_json(&challenge("0.10", 300)))
        .mount(&server)
        .await;

    let payer = client(X402ClientConfig::default().with_max_payment_amount("0.05"));
    let http = reqwest::Client::new()
        .with_payments(X402Payments::new(payer))
        .build();

    let response = http
        .get(format!("{}/open", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let err = http
        .get(format!("{}/pricey", server.uri()))
        .send()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Payment limit exceeded"));
}

#[tokio::test]
async fn close_is_idempotent_and_final() {
    let mut client = client(X402ClientConfig::default());
    client.close();
    client.close();
    assert!(client.is_closed());

    let err = client
        .create_payment(&challenge("0.10", 300), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Closed));
}
