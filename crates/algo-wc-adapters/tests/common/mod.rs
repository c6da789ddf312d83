#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::Bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify, Semaphore};

use algo_wc_adapters::{Network, OutboundMessage, WalletAccountsAdapter, WalletConnectAdapter};
use algo_wc_core::{
    AdapterEvent, ChainId, ClockPort, CoordinatorError, CoordinatorEvent, CoordinatorPolicy,
    NetworkSubmitPort, PortError, ProtocolVersion, PushSubscriptionPort, Request, Session,
    SessionCoordinator, SignError, SigningPort, SubmitError, WalletAccount, WalletState,
};

pub const ALICE: &str = "ALICEUJZDEGXDNCF32EPF3DHODZDOCIS2JHTLGMXGEDN73U55XTPLPFT7V";
pub const BOB: &str = "BOB4SEH2KVJ72CEUVW75EFR6EDT4SYWB5WKH7DNSIPZZ7FK4ZRI3R2WYOJ";
pub const LEDGER: &str = "LEDGERYM6L3VFZ5ZFKKIBJ5J6WJIBAGI3MNBQNSPUQ2IDW52IJB4LAJLJ6";
pub const START_MS: u64 = 1_739_750_400_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug)]
pub struct TestClock {
    now: AtomicU64,
}

impl Default for TestClock {
    fn default() -> Self {
        Self {
            now: AtomicU64::new(START_MS),
        }
    }
}

impl TestClock {
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.load(Ordering::SeqCst))
    }
}

/// Signs by prefixing the payload; optionally parks inside `sign` until released.
#[derive(Debug, Default)]
pub struct FakeSigner {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
    pub entered: Arc<Notify>,
}

impl FakeSigner {
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let signer = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (signer, gate)
    }

    pub fn fail_for(&self, address: &str) {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(address.to_owned());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl SigningPort for FakeSigner {
    async fn sign(&self, payload: &[u8], signer_address: &str) -> Result<Bytes, SignError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(signer_address.to_owned());
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| SignError::Device("gate closed".to_owned()))?
                .forget();
        }
        if self
            .failing
            .lock()
            .expect("failing lock")
            .contains(signer_address)
        {
            return Err(SignError::Device("ledger disconnected".to_owned()));
        }
        let mut signed = b"sig:".to_vec();
        signed.extend_from_slice(payload);
        Ok(Bytes::from(signed))
    }
}

#[derive(Debug, Default)]
pub struct FakeSubmitter {
    pub fail: AtomicBool,
    submitted: Mutex<Vec<Vec<u8>>>,
}

impl FakeSubmitter {
    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().expect("submitted lock").clone()
    }
}

impl NetworkSubmitPort for FakeSubmitter {
    async fn submit(&self, signed_payload: &[u8]) -> Result<String, SubmitError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SubmitError::Rejected("overspend".to_owned()));
        }
        let mut g = self.submitted.lock().expect("submitted lock");
        g.push(signed_payload.to_vec());
        Ok(format!("TXID{}", g.len()))
    }
}

#[derive(Debug, Default)]
pub struct FakePush {
    calls: Mutex<Vec<(String, String)>>,
}

impl FakePush {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("push lock").clone()
    }
}

impl PushSubscriptionPort for FakePush {
    async fn subscribe(&self, session: &Session, push_token: &str) -> Result<(), PortError> {
        self.calls
            .lock()
            .expect("push lock")
            .push((session.topic.clone(), push_token.to_owned()));
        Ok(())
    }
}

pub type TestCoordinator = SessionCoordinator<
    WalletConnectAdapter,
    FakeSigner,
    FakeSubmitter,
    FakePush,
    WalletAccountsAdapter,
    TestClock,
>;

pub struct Harness {
    pub coordinator: Arc<TestCoordinator>,
    pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    pub events: mpsc::UnboundedReceiver<CoordinatorEvent>,
}

impl Harness {
    pub fn drain_outbound(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            out.push(msg);
        }
        out
    }

    pub fn drain_events(&mut self) -> Vec<CoordinatorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn parse(&self, version: ProtocolVersion, topic: &str, raw: Value) -> AdapterEvent {
        self.coordinator
            .walletconnect
            .parse_event(version, topic, &raw.to_string())
            .expect("parse relay message")
    }

    pub fn receive(
        &self,
        version: ProtocolVersion,
        topic: &str,
        raw: Value,
    ) -> Result<Request, CoordinatorError> {
        match self.parse(version, topic, raw) {
            AdapterEvent::Request(envelope) => self.coordinator.receive_request(envelope),
            other => panic!("expected request event, got {other:?}"),
        }
    }

    /// Proposes and approves a session for `account`, then clears the channels.
    pub fn connect(&mut self, version: ProtocolVersion, topic: &str, account: &str) -> Session {
        let proposal = match version {
            ProtocolVersion::V1 => v1_session_request(1),
            ProtocolVersion::V2 => v2_session_propose(1),
        };
        self.coordinator
            .handle_event(self.parse(version, topic, proposal))
            .expect("propose session");
        let session = self
            .coordinator
            .decide_session(topic, true, Some(account))
            .expect("approve session");
        self.drain_outbound();
        self.drain_events();
        session
    }
}

pub fn wallet_state() -> WalletState {
    WalletState::default()
        .with_chain(ChainId::new(ChainId::TESTNET))
        .with_account(WalletAccount::software(ALICE))
        .with_account(WalletAccount::software("ADDR1"))
        .with_account(WalletAccount {
            requires_hardware: true,
            ..WalletAccount::software(LEDGER)
        })
}

pub fn harness_with(policy: CoordinatorPolicy, signer: FakeSigner) -> Harness {
    init_tracing();
    let (walletconnect, outbound) = WalletConnectAdapter::new(Network::Testnet);
    let (coordinator, events) = SessionCoordinator::new(
        walletconnect,
        signer,
        FakeSubmitter::default(),
        FakePush::default(),
        WalletAccountsAdapter::new(wallet_state()),
        TestClock::default(),
        policy,
    );
    Harness {
        coordinator: Arc::new(coordinator),
        outbound,
        events,
    }
}

pub fn harness() -> Harness {
    harness_with(CoordinatorPolicy::default(), FakeSigner::default())
}

pub fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn v1_session_request(id: u64) -> Value {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "method": "wc_sessionRequest",
        "params": [{
            "peerId": "peer-1",
            "peerMeta": {
                "name": "Tinyman",
                "url": "https://tinyman.org",
                "description": "AMM",
                "icons": ["https://tinyman.org/icon.png"]
            },
            "chainId": 416002
        }]
    })
}

pub fn v2_session_propose(id: u64) -> Value {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "method": "wc_sessionPropose",
        "params": {
            "proposer": {
                "publicKey": "abcd",
                "metadata": {
                    "name": "Folks Finance",
                    "url": "https://folks.finance",
                    "icons": []
                }
            },
            "requiredNamespaces": {
                "algorand": {
                    "chains": [Network::Testnet.caip2_chain()],
                    "methods": ["algo_signTxn"],
                    "events": []
                }
            }
        }
    })
}

/// Wraps a method call in the version's relay envelope.
pub fn rpc(version: ProtocolVersion, id: u64, method: &str, params: Value) -> Value {
    match version {
        ProtocolVersion::V1 => json!({
            "id": id,
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        }),
        ProtocolVersion::V2 => json!({
            "id": id,
            "jsonrpc": "2.0",
            "method": "wc_sessionRequest",
            "params": {
                "request": { "method": method, "params": params },
                "chainId": Network::Testnet.caip2_chain()
            }
        }),
    }
}

pub fn sign_txn(version: ProtocolVersion, id: u64, signer: &str) -> Value {
    rpc(
        version,
        id,
        "algo_signTxn",
        json!([[{ "txn": b64(&[id as u8, 1, 2, 3]), "signers": [signer] }]]),
    )
}

pub fn sign_data(version: ProtocolVersion, id: u64, signer: &str, count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| json!({ "data": b64(format!("data-{i}").as_bytes()), "signer": signer }))
        .collect();
    rpc(version, id, "algo_signData", json!([items]))
}

pub fn error_code(msg: &OutboundMessage) -> Option<i64> {
    msg.payload
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_i64)
}
