//! Tests for the solver gateway against a mock HTTP server

use omni_client::error::ClientError;
use omni_client::intents::{IntentBuilder, IntentSigner, IntentsClient, TokenId};
use omni_client::router::{QuoteAmount, QuoteRouter, QuoteSource};
use omni_client::solver_client::{SettlementStatus, SolverGateway};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    account_id, create_account, create_default_intents_config, create_signer,
    create_solver_config, MockRpc, DUMMY_ACCOUNT_ID, DUMMY_TOKEN_OTHER, DUMMY_TOKEN_USDT,
    DUMMY_TOKEN_WNEAR,
};

const DUMMY_INTENT_HASH: &str = "9pSd4jXzDtZ7w8yv8m4Cm6Y9V8mUqg5p1tY2n3KQb1c";
const DUMMY_SETTLEMENT_TX: &str = "GkT1eYxqZyFZ4vQw9ZtXn1C5CqQkQm8hJ7m6f2i1b3x";

fn gateway(server: &MockServer) -> SolverGateway {
    SolverGateway::new(&create_solver_config(&server.uri())).unwrap()
}

fn token(id: &str) -> TokenId {
    id.parse().unwrap()
}

fn signed_swap() -> omni_client::intents::Commitment {
    let signer = IntentSigner::new(
        account_id(DUMMY_ACCOUNT_ID),
        create_signer(1),
        &create_default_intents_config(),
    )
    .unwrap();
    IntentBuilder::new()
        .give(token(DUMMY_TOKEN_WNEAR), 100)
        .take(token(DUMMY_TOKEN_USDT), 300)
        .sign(&signer)
        .unwrap()
}

async fn last_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    serde_json::from_slice(&requests.last().unwrap().body).unwrap()
}

// ============================================================================
// QUOTES
// ============================================================================

/// What is tested: quotes are requested with string amounts and the best one is picked
/// Why: Selling exactly N should take the quote with the highest output
#[tokio::test]
async fn test_best_quote_for_exact_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                {"quote_hash": "low", "amount_in": "100", "amount_out": "250",
                 "expiration_time": "2030-01-01T00:00:00Z"},
                {"quote_hash": "high", "amount_in": "100", "amount_out": "300",
                 "expiration_time": "2030-01-01T00:00:10Z"}
            ]
        })))
        .mount(&server)
        .await;

    let quote = gateway(&server)
        .best_quote(
            &token(DUMMY_TOKEN_WNEAR),
            &token(DUMMY_TOKEN_USDT),
            QuoteAmount::ExactIn(100),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(quote.quote_hashes, vec!["high".to_string()]);
    assert_eq!(quote.amount_out, 300);
    assert_eq!(
        quote.expires_at.unwrap().to_rfc3339(),
        "2030-01-01T00:00:10+00:00"
    );

    let body = last_body(&server).await;
    assert_eq!(body["defuse_asset_identifier_in"], DUMMY_TOKEN_WNEAR);
    assert_eq!(body["exact_amount_in"], "100");
    assert!(body.get("exact_amount_out").is_none());
    assert_eq!(body["min_deadline_ms"], 10_000);
}

/// What is tested: buying exactly N picks the quote with the lowest input
/// Why: Exact-output quotes compete on cost
#[tokio::test]
async fn test_best_quote_for_exact_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"quote_hash": "pricey", "amount_in": "120", "amount_out": "50"},
            {"quote_hash": "cheap", "amount_in": "90", "amount_out": "50"}
        ])))
        .mount(&server)
        .await;

    let quote = gateway(&server)
        .best_quote(
            &token(DUMMY_TOKEN_WNEAR),
            &token(DUMMY_TOKEN_USDT),
            QuoteAmount::ExactOut(50),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(quote.quote_hashes, vec!["cheap".to_string()]);
    assert!(quote.expires_at.is_none());
    assert_eq!(last_body(&server).await["exact_amount_out"], "50");
}

/// What is tested: a null quote answer means no quote; HTTP errors read as none through QuoteSource
/// Why: The router treats unavailable pairs as missing, not fatal
#[tokio::test]
async fn test_no_quotes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": null})))
        .mount(&server)
        .await;
    let gateway = gateway(&server);
    let wnear = token(DUMMY_TOKEN_WNEAR);
    let usdt = token(DUMMY_TOKEN_USDT);

    assert!(gateway
        .quotes(&wnear, &usdt, QuoteAmount::ExactIn(1))
        .await
        .unwrap()
        .is_empty());

    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&failing)
        .await;
    let failing_gateway = SolverGateway::new(&create_solver_config(&failing.uri())).unwrap();
    let direct = failing_gateway
        .best_quote(&wnear, &usdt, QuoteAmount::ExactIn(1))
        .await;
    assert!(matches!(direct, Err(ClientError::Solver(ref m)) if m.contains("500")));
    let via_trait = failing_gateway
        .quote(&wnear, &usdt, QuoteAmount::ExactIn(1))
        .await
        .unwrap();
    assert!(via_trait.is_none());
}

/// What is tested: the router composes gateway quotes into a two-hop route
/// Why: Routing runs against the live solver API in production
#[tokio::test]
async fn test_router_over_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/quote"))
        .respond_with(move |request: &wiremock::Request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let pair = (
                body["defuse_asset_identifier_in"].as_str().unwrap().to_string(),
                body["defuse_asset_identifier_out"].as_str().unwrap().to_string(),
            );
            let amount: u128 = body["exact_amount_in"].as_str().unwrap().parse().unwrap();
            let out = match (pair.0.as_str(), pair.1.as_str()) {
                (DUMMY_TOKEN_WNEAR, DUMMY_TOKEN_USDT) => amount * 3,
                (DUMMY_TOKEN_USDT, DUMMY_TOKEN_OTHER) => amount,
                (DUMMY_TOKEN_WNEAR, DUMMY_TOKEN_OTHER) => amount * 2,
                _ => return ResponseTemplate::new(200).set_body_json(json!([])),
            };
            ResponseTemplate::new(200).set_body_json(json!([{
                "quote_hash": format!("{}:{}", pair.0, pair.1),
                "amount_in": amount.to_string(),
                "amount_out": out.to_string()
            }]))
        })
        .mount(&server)
        .await;

    let router = QuoteRouter::new(
        Arc::new(gateway(&server)),
        vec![token(DUMMY_TOKEN_USDT)],
        1,
    );
    let route = router
        .find_route(
            &token(DUMMY_TOKEN_WNEAR),
            &token(DUMMY_TOKEN_OTHER),
            QuoteAmount::ExactIn(10),
            2,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(route.hops(), 2);
    assert_eq!(route.amount_out(), 30);
    assert_eq!(route.quote_hashes().len(), 2);
}

// ============================================================================
// PUBLICATION
// ============================================================================

/// What is tested: publishing sends the signed commitment with quote hashes and returns the intent hash
/// Why: The intent hash is the handle for settlement polling
#[tokio::test]
async fn test_publish_ok() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/publish_intent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"status": "OK", "intent_hash": DUMMY_INTENT_HASH}
        })))
        .mount(&server)
        .await;

    let commitment = signed_swap();
    let hash = gateway(&server)
        .publish(&commitment, &["q1".to_string()])
        .await
        .unwrap();
    assert_eq!(hash, DUMMY_INTENT_HASH);

    let body = last_body(&server).await;
    assert_eq!(body["quote_hashes"], json!(["q1"]));
    assert_eq!(body["signed_data"]["standard"], "raw_ed25519");
    assert_eq!(body["signed_data"]["payload"], commitment.payload_json());
}

/// What is tested: a non-OK status surfaces as SolverRejected with the reason
/// Why: Callers must see why the solver refused
#[tokio::test]
async fn test_publish_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/publish_intent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "FAILED", "reason": "quote expired"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .publish(&signed_swap(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::SolverRejected(ref r) if r == "quote expired"));
}

/// What is tested: batch publication returns one hash per commitment and rejects empty batches locally
/// Why: Linked intents settle together
#[tokio::test]
async fn test_publish_many() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/publish_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK", "intent_hashes": ["h1", "h2"]
        })))
        .mount(&server)
        .await;
    let gateway = gateway(&server);

    let hashes = gateway
        .publish_many(&[signed_swap(), signed_swap()], &[])
        .await
        .unwrap();
    assert_eq!(hashes, vec!["h1".to_string(), "h2".to_string()]);
    assert_eq!(last_body(&server).await["signed_datas"].as_array().unwrap().len(), 2);

    let before = server.received_requests().await.unwrap().len();
    assert!(matches!(
        gateway.publish_many(&[], &[]).await,
        Err(ClientError::Validation(_))
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), before);
}

// ============================================================================
// SIMULATION
// ============================================================================

/// What is tested: a failing simulation returns the solver payload and consumes no ledger nonce
/// Why: Dry runs must be free of side effects
#[tokio::test]
async fn test_simulation_failure_has_no_side_effects() {
    let server = MockServer::start().await;
    let answer = json!({
        "error_msg": "insufficient balance for nep141:wrap.near",
        "intents_executed": [],
        "logs": []
    });
    Mock::given(method("POST"))
        .and(path("/simulate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer.clone()))
        .mount(&server)
        .await;

    let mock = MockRpc::new();
    let account = Arc::new(create_account(&mock, 1));
    let client = IntentsClient::new(
        account,
        Arc::new(gateway(&server)),
        &create_default_intents_config(),
    )
    .unwrap();

    let builder = client
        .intent()
        .give(token(DUMMY_TOKEN_WNEAR), 100)
        .take(token(DUMMY_TOKEN_USDT), 300);
    let commitment = client.sign(&builder).unwrap();
    let err = client.simulate(&commitment).await.unwrap_err();

    match err {
        ClientError::Simulation { message, payload } => {
            assert!(message.contains("insufficient balance"));
            assert_eq!(payload, answer);
        }
        other => panic!("expected simulation error, got {:?}", other),
    }
    assert!(mock.calls().is_empty(), "simulation must not touch the ledger");
    assert_eq!(last_body(&server).await["signed"].as_array().unwrap().len(), 1);
}

/// What is tested: a successful simulation returns the executed intents
/// Why: Callers inspect what would happen before publishing
#[tokio::test]
async fn test_simulation_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/simulate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "intents_executed": [{"intent_hash": "h", "account_id": DUMMY_ACCOUNT_ID, "nonce": "n"}],
            "logs": []
        })))
        .mount(&server)
        .await;

    let result = gateway(&server).simulate(&signed_swap()).await.unwrap();
    assert!(result.success());
    assert_eq!(result.intents_executed.len(), 1);
}

// ============================================================================
// SETTLEMENT
// ============================================================================

/// What is tested: polling returns the settlement transaction once the intent settles
/// Why: Callers wait for settlement before reporting success
#[tokio::test]
async fn test_poll_settlement_settles() {
    let server = MockServer::start().await;
    let status_path = format!("/settlement/{}", DUMMY_INTENT_HASH);
    Mock::given(method("GET"))
        .and(path(status_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(status_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SETTLED", "data": {"hash": DUMMY_SETTLEMENT_TX}
        })))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let tx = gateway
        .poll_settlement(DUMMY_INTENT_HASH, gateway.settlement_timeout())
        .await;
    assert_eq!(tx.as_deref(), Some(DUMMY_SETTLEMENT_TX));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

/// What is tested: an intent that stays pending times out with None
/// Why: Settlement polling is bounded
#[tokio::test]
async fn test_poll_settlement_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    assert_eq!(
        gateway.get_status(DUMMY_INTENT_HASH).await.unwrap(),
        SettlementStatus::Pending
    );
    let tx = gateway
        .poll_settlement(DUMMY_INTENT_HASH, Duration::from_millis(200))
        .await;
    assert!(tx.is_none());
}

/// What is tested: an unbounded timeout keeps polling until a final status
/// Why: Duration::MAX is the natural way to ask for "wait forever"
#[tokio::test]
async fn test_poll_settlement_unbounded_timeout() {
    let server = MockServer::start().await;
    let status_path = format!("/settlement/{}", DUMMY_INTENT_HASH);
    Mock::given(method("GET"))
        .and(path(status_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(status_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SETTLED", "data": {"hash": DUMMY_SETTLEMENT_TX}
        })))
        .mount(&server)
        .await;

    let tx = gateway(&server)
        .poll_settlement(DUMMY_INTENT_HASH, Duration::MAX)
        .await;
    assert_eq!(tx.as_deref(), Some(DUMMY_SETTLEMENT_TX));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

/// What is tested: a failure status stops polling immediately
/// Why: Invalid intents will never settle
#[tokio::test]
async fn test_poll_settlement_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "NOT_FOUND_OR_NOT_VALID"})),
        )
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    assert_eq!(
        gateway.get_status(DUMMY_INTENT_HASH).await.unwrap(),
        SettlementStatus::Failed {
            status: "NOT_FOUND_OR_NOT_VALID".to_string()
        }
    );
    let tx = gateway
        .poll_settlement(DUMMY_INTENT_HASH, Duration::from_secs(5))
        .await;
    assert!(tx.is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

/// What is tested: submit_and_wait signs, publishes and waits in one call
/// Why: The common path for intent users
#[tokio::test]
async fn test_submit_and_wait() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/publish_intent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK", "intent_hash": DUMMY_INTENT_HASH
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/settlement/{}", DUMMY_INTENT_HASH).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SETTLED", "data": {"hash": DUMMY_SETTLEMENT_TX}
        })))
        .mount(&server)
        .await;

    let mock = MockRpc::new();
    let client = IntentsClient::new(
        Arc::new(create_account(&mock, 1)),
        Arc::new(gateway(&server)),
        &create_default_intents_config(),
    )
    .unwrap();
    let builder = client
        .intent()
        .transfer(account_id("bob.near"), [(token(DUMMY_TOKEN_USDT), 5)], None);

    let tx = client.submit_and_wait(&builder, &[]).await.unwrap();
    assert_eq!(tx.as_deref(), Some(DUMMY_SETTLEMENT_TX));
}
