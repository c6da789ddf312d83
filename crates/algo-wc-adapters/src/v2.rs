use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use serde_json::{json, Value};

use algo_wc_core::{
    AdapterEvent, ChainId, ErrorCodeMapper, ErrorReason, PeerMetadata, PortError,
    ProtocolVersion, RequestEnvelope, RequestMethod, Session, SessionProposal, WireError,
};

use crate::config::Network;
use crate::payload::parse_items;
use crate::wc::{error_reply, InboundRpc, OutboundKind, Outbox};

pub const ALGORAND_NAMESPACE: &str = "algorand";
pub const SUPPORTED_METHODS: [&str; 2] = ["algo_signTxn", "algo_signData"];

#[derive(Debug, Clone, Default, Deserialize)]
struct V2Metadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    icons: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct V2Proposer {
    #[serde(default)]
    metadata: V2Metadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct V2Namespace {
    #[serde(default)]
    chains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V2SessionPropose {
    #[serde(default)]
    proposer: V2Proposer,
    #[serde(default)]
    required_namespaces: HashMap<String, V2Namespace>,
    #[serde(default)]
    optional_namespaces: HashMap<String, V2Namespace>,
}

#[derive(Debug, Clone, Deserialize)]
struct V2InnerRequest {
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V2SessionRequest {
    request: V2InnerRequest,
    chain_id: String,
}

/// WalletConnect v2 sign protocol: named params, CAIP-2 chains and namespaces.
#[derive(Debug, Clone)]
pub struct V2Adapter {
    network: Network,
    outbox: Outbox,
}

impl V2Adapter {
    pub(crate) fn new(network: Network, outbox: Outbox) -> Self {
        Self { network, outbox }
    }

    pub(crate) fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn chain_from_wire(chain: &str) -> ChainId {
        Network::from_caip2(chain)
            .map(Network::chain_id)
            .unwrap_or_else(|| ChainId::new(chain))
    }

    pub fn parse_event(&self, topic: &str, raw: &str) -> Result<AdapterEvent, PortError> {
        let rpc = InboundRpc::parse(ProtocolVersion::V2, raw)?;
        match rpc.method.as_str() {
            "wc_sessionPropose" => self.parse_proposal(topic, rpc),
            "wc_sessionRequest" => self.parse_request(topic, rpc),
            "wc_sessionDelete" => Ok(AdapterEvent::PeerDisconnect {
                topic: topic.to_owned(),
            }),
            other => Err(PortError::Validation(format!(
                "unsupported v2 relay method: {other}"
            ))),
        }
    }

    fn parse_proposal(&self, topic: &str, rpc: InboundRpc) -> Result<AdapterEvent, PortError> {
        let propose: V2SessionPropose = serde_json::from_value(rpc.params)
            .map_err(|e| PortError::Validation(format!("v2 session proposal: {e}")))?;
        let requested_chains: BTreeSet<ChainId> = [
            propose.required_namespaces.get(ALGORAND_NAMESPACE),
            propose.optional_namespaces.get(ALGORAND_NAMESPACE),
        ]
        .into_iter()
        .flatten()
        .flat_map(|ns| ns.chains.iter())
        .map(|chain| Self::chain_from_wire(chain))
        .collect();
        if requested_chains.is_empty() {
            return Err(PortError::Validation(
                "v2 proposal requests no algorand chains".to_owned(),
            ));
        }
        let meta = propose.proposer.metadata;
        Ok(AdapterEvent::SessionProposal(SessionProposal {
            topic: topic.to_owned(),
            proposal_id: rpc.id,
            protocol_version: ProtocolVersion::V2,
            peer: PeerMetadata {
                name: meta.name,
                url: meta.url,
                description: meta.description,
                icons: meta.icons,
            },
            requested_chains,
        }))
    }

    fn parse_request(&self, topic: &str, rpc: InboundRpc) -> Result<AdapterEvent, PortError> {
        let request: V2SessionRequest = serde_json::from_value(rpc.params)
            .map_err(|e| PortError::Validation(format!("v2 session request: {e}")))?;
        let method = RequestMethod::from_wire(&request.request.method);
        let parsed = parse_items(&method, &request.request.params);
        Ok(AdapterEvent::Request(RequestEnvelope {
            request_id: rpc.id,
            topic: topic.to_owned(),
            protocol_version: ProtocolVersion::V2,
            method,
            chain_id: Self::chain_from_wire(&request.chain_id),
            items: parsed.items,
            message: parsed.message,
        }))
    }

    /// Session namespaces: every requested chain this wallet knows, crossed with the account.
    pub fn namespaces(&self, session: &Session) -> Result<Value, PortError> {
        let account = session
            .approved_account_address
            .as_deref()
            .ok_or_else(|| PortError::Validation(format!("session {} has no account", session.topic)))?;
        let chains: Vec<String> = session
            .requested_chain_ids
            .iter()
            .filter_map(Network::from_chain_id)
            .map(Network::caip2_chain)
            .collect();
        if chains.is_empty() {
            return Err(PortError::Validation(format!(
                "session {} has no known algorand chain",
                session.topic
            )));
        }
        let accounts: Vec<String> = chains
            .iter()
            .map(|chain| format!("{chain}:{account}"))
            .collect();
        Ok(json!({
            "algorand": {
                "chains": chains,
                "accounts": accounts,
                "methods": SUPPORTED_METHODS,
                "events": [],
            }
        }))
    }

    pub fn approve_session(&self, session: &Session) -> Result<(), PortError> {
        let namespaces = self.namespaces(session)?;
        self.outbox.send(
            ProtocolVersion::V2,
            &session.topic,
            OutboundKind::SessionApprove,
            json!({
                "id": session.proposal_id,
                "jsonrpc": "2.0",
                "result": { "namespaces": namespaces },
            }),
        )
    }

    pub fn reject_session(&self, session: &Session, error: &WireError) -> Result<(), PortError> {
        self.outbox.send(
            ProtocolVersion::V2,
            &session.topic,
            OutboundKind::SessionReject,
            error_reply(session.proposal_id, error),
        )
    }

    pub fn update_session(&self, session: &Session) -> Result<(), PortError> {
        let namespaces = self.namespaces(session)?;
        self.outbox.send(
            ProtocolVersion::V2,
            &session.topic,
            OutboundKind::SessionUpdate,
            json!({
                "id": self.outbox.next_id(),
                "jsonrpc": "2.0",
                "method": "wc_sessionUpdate",
                "params": { "namespaces": namespaces },
            }),
        )
    }

    pub fn disconnect_session(&self, session: &Session) -> Result<(), PortError> {
        let reason = ErrorCodeMapper::map_v2(ErrorReason::SessionNotFound);
        self.outbox.send(
            ProtocolVersion::V2,
            &session.topic,
            OutboundKind::SessionDelete,
            json!({
                "id": self.outbox.next_id(),
                "jsonrpc": "2.0",
                "method": "wc_sessionDelete",
                "params": { "code": reason.code, "message": "User disconnected." },
            }),
        )
    }
}
