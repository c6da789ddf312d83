mod common;

use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};
use tiny_http::{Response, Server, StatusCode};

use algo_wc_adapters::{AlgodSubmitAdapter, NetworkConfig, PushSubscriptionAdapter};
use algo_wc_core::{
    ChainId, NetworkSubmitPort, PeerMetadata, ProtocolVersion, PushSubscriptionPort, Session,
    SessionProposal, SubmitError, TimestampMs,
};

#[derive(Debug, Clone)]
struct Call {
    method: String,
    path: String,
    token: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

fn spawn_mock_server(
    calls: Arc<Mutex<Vec<Call>>>,
    replies: Vec<(u16, Value)>,
) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());

    let join = thread::spawn(move || {
        for (code, payload) in replies {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let header = |name: &'static str| {
                req.headers()
                    .iter()
                    .find(|h| h.field.equiv(name))
                    .map(|h| h.value.as_str().to_owned())
            };
            let token = header("X-Algo-API-Token");
            let content_type = header("Content-Type");
            let mut body = Vec::new();
            let _ = req.as_reader().read_to_end(&mut body);
            if let Ok(mut g) = calls.lock() {
                g.push(Call {
                    method: req.method().to_string(),
                    path: req.url().to_owned(),
                    token,
                    content_type,
                    body,
                });
            }
            let response =
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    (addr, join)
}

fn config(base_url: &str) -> NetworkConfig {
    NetworkConfig {
        algod_url: format!("{base_url}/"),
        algod_token: Some("secret-token".to_owned()),
        push_backend_url: base_url.to_owned(),
        ..NetworkConfig::testnet()
    }
}

fn session() -> Session {
    let mut session = Session::from_proposal(
        SessionProposal {
            topic: "topic-push".to_owned(),
            proposal_id: 1,
            protocol_version: ProtocolVersion::V1,
            peer: PeerMetadata {
                name: "Tinyman".to_owned(),
                url: "https://tinyman.org".to_owned(),
                ..PeerMetadata::default()
            },
            requested_chains: [ChainId::new(ChainId::TESTNET)].into(),
        },
        TimestampMs(1),
    );
    session.approved_account_address = Some(common::ALICE.to_owned());
    session
}

#[tokio::test]
async fn algod_submit_posts_raw_group_with_token() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (base_url, join) = spawn_mock_server(
        Arc::clone(&calls),
        vec![(200, json!({ "txId": "TXABC" }))],
    );

    let adapter = AlgodSubmitAdapter::with_config(&config(&base_url), 5_000).expect("adapter");
    let tx_id = adapter.submit(&[1, 2, 3, 4]).await.expect("submit");
    assert_eq!(tx_id, "TXABC");
    join.join().expect("server thread");

    let calls = calls.lock().expect("calls lock");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "POST");
    assert_eq!(calls[0].path, "/v2/transactions");
    assert_eq!(calls[0].token.as_deref(), Some("secret-token"));
    assert_eq!(calls[0].content_type.as_deref(), Some("application/x-binary"));
    assert_eq!(calls[0].body, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn algod_rejection_keeps_node_message() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (base_url, _join) = spawn_mock_server(
        Arc::clone(&calls),
        vec![(400, json!({ "message": "overspend" }))],
    );

    let adapter = AlgodSubmitAdapter::with_config(&config(&base_url), 5_000).expect("adapter");
    let err = adapter.submit(&[9]).await.expect_err("rejected");
    assert!(matches!(err, SubmitError::Rejected(_)));
    assert!(err.to_string().contains("overspend"));
}

#[tokio::test]
async fn algod_unreachable_is_transport_error() {
    let cfg = NetworkConfig {
        algod_url: "http://127.0.0.1:9".to_owned(),
        ..NetworkConfig::testnet()
    };
    let adapter = AlgodSubmitAdapter::with_config(&cfg, 1_000).expect("adapter");
    let err = adapter.submit(&[1]).await.expect_err("unreachable");
    assert!(matches!(err, SubmitError::Transport(_)));
}

#[tokio::test]
async fn push_subscription_posts_topic_and_token() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (base_url, join) = spawn_mock_server(Arc::clone(&calls), vec![(201, json!({}))]);

    let adapter = PushSubscriptionAdapter::with_config(&config(&base_url), 5_000).expect("adapter");
    adapter
        .subscribe(&session(), "device-token")
        .await
        .expect("subscribe");
    join.join().expect("server thread");

    let calls = calls.lock().expect("calls lock");
    assert_eq!(calls[0].path, "/v1/wallet-connect/subscribe/");
    let body: Value = serde_json::from_slice(&calls[0].body).expect("json body");
    assert_eq!(
        body,
        json!({
            "topic_id": "topic-push",
            "dapp_name": "Tinyman",
            "peer_url": "https://tinyman.org",
            "push_token": "device-token"
        })
    );
}

#[tokio::test]
async fn push_backend_failure_is_reported() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (base_url, _join) = spawn_mock_server(Arc::clone(&calls), vec![(500, json!({}))]);

    let adapter = PushSubscriptionAdapter::with_config(&config(&base_url), 5_000).expect("adapter");
    let err = adapter
        .subscribe(&session(), "device-token")
        .await
        .expect_err("backend down");
    assert!(err.to_string().contains("push subscribe status 500"));
}
