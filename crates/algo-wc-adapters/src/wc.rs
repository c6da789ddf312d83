use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use algo_wc_core::{
    AdapterEvent, PortError, ProtocolVersion, ResponseTarget, Session, SignedResponse,
    WalletConnectPort, WireError,
};

use crate::config::Network;
use crate::payload::encode_signatures;
use crate::v1::V1Adapter;
use crate::v2::V2Adapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundKind {
    SessionApprove,
    SessionReject,
    SessionUpdate,
    SessionDelete,
    Response,
    ErrorResponse,
}

/// Encoded JSON-RPC message waiting to be published on a session topic by
/// the relay transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub protocol_version: ProtocolVersion,
    pub topic: String,
    pub kind: OutboundKind,
    pub payload: Value,
}

/// Inbound JSON-RPC request as delivered by either relay.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InboundRpc {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl InboundRpc {
    pub fn parse(version: ProtocolVersion, raw: &str) -> Result<Self, PortError> {
        serde_json::from_str(raw)
            .map_err(|e| PortError::Validation(format!("{version:?} json-rpc message: {e}")))
    }
}

/// Outbound side shared by both protocol adapters.
#[derive(Debug, Clone)]
pub(crate) struct Outbox {
    sender: mpsc::UnboundedSender<OutboundMessage>,
    next_id: Arc<AtomicU64>,
}

impl Outbox {
    fn new(sender: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Id for a wallet-initiated JSON-RPC request.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn send(
        &self,
        protocol_version: ProtocolVersion,
        topic: &str,
        kind: OutboundKind,
        payload: Value,
    ) -> Result<(), PortError> {
        debug!(topic, version = ?protocol_version, kind = ?kind, "outbound message queued");
        self.sender
            .send(OutboundMessage {
                protocol_version,
                topic: topic.to_owned(),
                kind,
                payload,
            })
            .map_err(|_| PortError::Transport("walletconnect outbound channel closed".to_owned()))
    }

    pub fn respond_success(
        &self,
        target: &ResponseTarget,
        response: &SignedResponse,
    ) -> Result<(), PortError> {
        self.send(
            target.protocol_version,
            &target.topic,
            OutboundKind::Response,
            json!({
                "id": target.request_id,
                "jsonrpc": "2.0",
                "result": encode_signatures(response),
            }),
        )
    }

    pub fn respond_error(&self, target: &ResponseTarget, error: &WireError) -> Result<(), PortError> {
        self.send(
            target.protocol_version,
            &target.topic,
            OutboundKind::ErrorResponse,
            error_reply(target.request_id, error),
        )
    }
}

pub(crate) fn error_reply(id: u64, error: &WireError) -> Value {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "error": { "code": error.code(), "message": error.message() },
    })
}

/// Protocol implementation selected by the session's version tag.
#[derive(Debug, Clone, Copy)]
pub enum ProtocolAdapter<'a> {
    V1(&'a V1Adapter),
    V2(&'a V2Adapter),
}

impl ProtocolAdapter<'_> {
    pub fn parse_event(&self, topic: &str, raw: &str) -> Result<AdapterEvent, PortError> {
        match self {
            Self::V1(a) => a.parse_event(topic, raw),
            Self::V2(a) => a.parse_event(topic, raw),
        }
    }

    fn approve_session(&self, session: &Session) -> Result<(), PortError> {
        match self {
            Self::V1(a) => a.approve_session(session),
            Self::V2(a) => a.approve_session(session),
        }
    }

    fn reject_session(&self, session: &Session, error: &WireError) -> Result<(), PortError> {
        match self {
            Self::V1(a) => a.reject_session(session, error),
            Self::V2(a) => a.reject_session(session, error),
        }
    }

    fn update_session(&self, session: &Session) -> Result<(), PortError> {
        match self {
            Self::V1(a) => a.update_session(session),
            Self::V2(a) => a.update_session(session),
        }
    }

    fn disconnect_session(&self, session: &Session) -> Result<(), PortError> {
        match self {
            Self::V1(a) => a.disconnect_session(session),
            Self::V2(a) => a.disconnect_session(session),
        }
    }

    fn outbox(&self) -> &Outbox {
        match self {
            Self::V1(a) => a.outbox(),
            Self::V2(a) => a.outbox(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletConnectAdapter {
    v1: V1Adapter,
    v2: V2Adapter,
}

impl WalletConnectAdapter {
    pub fn new(network: Network) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let outbox = Outbox::new(sender);
        let adapter = Self {
            v1: V1Adapter::new(network, outbox.clone()),
            v2: V2Adapter::new(network, outbox),
        };
        (adapter, receiver)
    }

    pub fn adapter(&self, version: ProtocolVersion) -> ProtocolAdapter<'_> {
        match version {
            ProtocolVersion::V1 => ProtocolAdapter::V1(&self.v1),
            ProtocolVersion::V2 => ProtocolAdapter::V2(&self.v2),
        }
    }

    /// Normalizes a raw relay message received on `topic`.
    pub fn parse_event(
        &self,
        version: ProtocolVersion,
        topic: &str,
        raw: &str,
    ) -> Result<AdapterEvent, PortError> {
        self.adapter(version).parse_event(topic, raw)
    }
}

impl WalletConnectPort for WalletConnectAdapter {
    fn approve_session(&self, session: &Session) -> Result<(), PortError> {
        self.adapter(session.protocol_version)
            .approve_session(session)
    }

    fn reject_session(&self, session: &Session, error: &WireError) -> Result<(), PortError> {
        self.adapter(session.protocol_version)
            .reject_session(session, error)
    }

    fn update_session(&self, session: &Session) -> Result<(), PortError> {
        self.adapter(session.protocol_version).update_session(session)
    }

    fn disconnect_session(&self, session: &Session) -> Result<(), PortError> {
        self.adapter(session.protocol_version)
            .disconnect_session(session)
    }

    fn respond_success(
        &self,
        target: &ResponseTarget,
        response: &SignedResponse,
    ) -> Result<(), PortError> {
        self.adapter(target.protocol_version)
            .outbox()
            .respond_success(target, response)
    }

    fn respond_error(&self, target: &ResponseTarget, error: &WireError) -> Result<(), PortError> {
        self.adapter(target.protocol_version)
            .outbox()
            .respond_error(target, error)
    }
}
