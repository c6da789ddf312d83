mod common;

use std::collections::BTreeSet;

use serde_json::json;

use tokio::sync::mpsc::UnboundedReceiver;

use algo_wc_adapters::{
    Network, OutboundKind, OutboundMessage, ProtocolAdapter, WalletConnectAdapter,
};
use algo_wc_core::{
    AdapterEvent, ChainId, ErrorCodeMapper, ErrorReason, PeerMetadata, ProtocolVersion,
    RequestMethod, ResponseTarget, Session, SessionProposal, TimestampMs, WalletConnectPort,
};

use common::{b64, rpc, sign_data, v1_session_request, v2_session_propose, ALICE};

fn adapter() -> (WalletConnectAdapter, UnboundedReceiver<OutboundMessage>) {
    WalletConnectAdapter::new(Network::Testnet)
}

fn parse(wc: &WalletConnectAdapter, version: ProtocolVersion, raw: serde_json::Value) -> AdapterEvent {
    wc.parse_event(version, "topic", &raw.to_string())
        .expect("parse")
}

#[test]
fn dispatch_follows_the_version_tag() {
    let (wc, _rx) = adapter();
    assert!(matches!(wc.adapter(ProtocolVersion::V1), ProtocolAdapter::V1(_)));
    assert!(matches!(wc.adapter(ProtocolVersion::V2), ProtocolAdapter::V2(_)));
}

#[test]
fn v1_proposal_normalizes_peer_and_chain() {
    let (wc, _rx) = adapter();
    let AdapterEvent::SessionProposal(proposal) =
        parse(&wc, ProtocolVersion::V1, v1_session_request(42))
    else {
        panic!("expected proposal");
    };
    assert_eq!(proposal.proposal_id, 42);
    assert_eq!(proposal.topic, "topic");
    assert_eq!(proposal.peer.name, "Tinyman");
    assert_eq!(proposal.peer.description.as_deref(), Some("AMM"));
    assert_eq!(
        proposal.requested_chains,
        BTreeSet::from([ChainId::new(ChainId::TESTNET)])
    );
}

#[test]
fn v1_numeric_chain_ids_map_to_networks() {
    let (wc, _rx) = adapter();
    let ProtocolAdapter::V1(v1) = wc.adapter(ProtocolVersion::V1) else {
        panic!("v1 adapter");
    };
    assert_eq!(v1.chain_from_wire(4160), ChainId::new(ChainId::TESTNET));
    assert_eq!(v1.chain_from_wire(416001), ChainId::new(ChainId::MAINNET));
    assert_eq!(v1.chain_from_wire(416003), ChainId::new(ChainId::BETANET));
    assert_eq!(v1.chain_from_wire(1), ChainId::new("v1:1"));
}

#[test]
fn v1_data_request_uses_item_chain() {
    let (wc, _rx) = adapter();
    let raw = rpc(
        ProtocolVersion::V1,
        5,
        "algo_signData",
        json!([[{ "data": b64(b"hello"), "signer": ALICE, "chainId": 416001, "message": "login" }]]),
    );
    let AdapterEvent::Request(envelope) = parse(&wc, ProtocolVersion::V1, raw) else {
        panic!("expected request");
    };
    assert_eq!(envelope.method, RequestMethod::SignData);
    assert_eq!(envelope.chain_id, ChainId::new(ChainId::MAINNET));
    assert_eq!(envelope.message.as_deref(), Some("login"));
    assert_eq!(envelope.items[0].payload.to_vec(), b"hello".to_vec());
}

#[test]
fn v1_peer_session_update_must_be_a_disconnect() {
    let (wc, _rx) = adapter();
    let raw = json!({
        "id": 3,
        "jsonrpc": "2.0",
        "method": "wc_sessionUpdate",
        "params": [{ "approved": true, "chainId": 416002, "accounts": [] }]
    });
    let err = wc
        .parse_event(ProtocolVersion::V1, "topic", &raw.to_string())
        .expect_err("not a disconnect");
    assert!(err.to_string().contains("not a disconnect"));
}

#[test]
fn v2_proposal_collects_required_and_optional_chains() {
    let (wc, _rx) = adapter();
    let mut raw = v2_session_propose(8);
    raw["params"]["optionalNamespaces"] = json!({
        "algorand": { "chains": [Network::Mainnet.caip2_chain(), "algorand:unknown"] }
    });
    let AdapterEvent::SessionProposal(proposal) = parse(&wc, ProtocolVersion::V2, raw) else {
        panic!("expected proposal");
    };
    assert_eq!(proposal.protocol_version, ProtocolVersion::V2);
    assert_eq!(proposal.peer.name, "Folks Finance");
    assert_eq!(
        proposal.requested_chains,
        BTreeSet::from([
            ChainId::new(ChainId::MAINNET),
            ChainId::new(ChainId::TESTNET),
            ChainId::new("algorand:unknown"),
        ])
    );
}

#[test]
fn v2_proposal_without_algorand_chains_is_refused() {
    let (wc, _rx) = adapter();
    let raw = json!({
        "id": 9,
        "jsonrpc": "2.0",
        "method": "wc_sessionPropose",
        "params": {
            "proposer": { "metadata": { "name": "x", "url": "https://x" } },
            "requiredNamespaces": { "eip155": { "chains": ["eip155:1"] } }
        }
    });
    let err = wc
        .parse_event(ProtocolVersion::V2, "topic", &raw.to_string())
        .expect_err("no algorand chains");
    assert!(err.to_string().contains("no algorand chains"));
}

#[test]
fn v2_request_and_delete_normalize() {
    let (wc, _rx) = adapter();
    let AdapterEvent::Request(envelope) = parse(
        &wc,
        ProtocolVersion::V2,
        sign_data(ProtocolVersion::V2, 77, ALICE, 3),
    ) else {
        panic!("expected request");
    };
    assert_eq!(envelope.request_id, 77);
    assert_eq!(envelope.protocol_version, ProtocolVersion::V2);
    assert_eq!(envelope.chain_id, ChainId::new(ChainId::TESTNET));
    assert_eq!(envelope.items.len(), 3);
    assert!(envelope.items.iter().all(|i| i.sign && i.signer.as_deref() == Some(ALICE)));

    let delete = json!({
        "id": 78,
        "jsonrpc": "2.0",
        "method": "wc_sessionDelete",
        "params": { "code": 6000, "message": "User disconnected." }
    });
    assert_eq!(
        parse(&wc, ProtocolVersion::V2, delete),
        AdapterEvent::PeerDisconnect {
            topic: "topic".to_owned()
        }
    );
}

#[test]
fn unknown_v2_relay_method_and_bad_json_are_errors() {
    let (wc, _rx) = adapter();
    let raw = json!({ "id": 1, "jsonrpc": "2.0", "method": "wc_sessionPing", "params": {} });
    let err = wc
        .parse_event(ProtocolVersion::V2, "topic", &raw.to_string())
        .expect_err("unknown method");
    assert!(err.to_string().contains("unsupported v2 relay method"));

    let err = wc
        .parse_event(ProtocolVersion::V1, "topic", "{not json")
        .expect_err("bad json");
    assert!(err.to_string().contains("json-rpc message"));
}

#[test]
fn error_responses_use_the_mapped_wire_error() {
    let (wc, mut rx) = adapter();
    let target = ResponseTarget {
        protocol_version: ProtocolVersion::V2,
        topic: "topic".to_owned(),
        request_id: 5,
    };
    let error = ErrorCodeMapper::map(ProtocolVersion::V2, ErrorReason::RequestExpired);
    wc.respond_error(&target, &error).expect("respond");

    let msg = rx.try_recv().expect("queued");
    assert_eq!(msg.kind, OutboundKind::ErrorResponse);
    assert_eq!(msg.protocol_version, ProtocolVersion::V2);
    assert_eq!(
        msg.payload,
        json!({
            "id": 5,
            "jsonrpc": "2.0",
            "error": { "code": 8000, "message": ErrorReason::RequestExpired.description() }
        })
    );
}

#[test]
fn closed_channel_surfaces_transport_error() {
    let (wc, rx) = adapter();
    drop(rx);
    let mut session = Session::from_proposal(
        SessionProposal {
            topic: "topic".to_owned(),
            proposal_id: 1,
            protocol_version: ProtocolVersion::V1,
            peer: PeerMetadata::default(),
            requested_chains: BTreeSet::from([ChainId::new(ChainId::TESTNET)]),
        },
        TimestampMs(1),
    );
    session.approved_account_address = Some(ALICE.to_owned());
    let err = wc.approve_session(&session).expect_err("channel closed");
    assert!(err.to_string().contains("outbound channel closed"));
}

#[test]
fn approval_needs_an_account() {
    let (wc, _rx) = adapter();
    let session = Session::from_proposal(
        SessionProposal {
            topic: "topic".to_owned(),
            proposal_id: 1,
            protocol_version: ProtocolVersion::V2,
            peer: PeerMetadata::default(),
            requested_chains: BTreeSet::from([ChainId::new(ChainId::TESTNET)]),
        },
        TimestampMs(1),
    );
    let err = wc.approve_session(&session).expect_err("no account");
    assert!(err.to_string().contains("has no account"));
}
