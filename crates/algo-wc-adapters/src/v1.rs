use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{json, Value};

use algo_wc_core::{
    AdapterEvent, ChainId, PeerMetadata, PortError, ProtocolVersion, RequestEnvelope,
    RequestMethod, Session, SessionProposal, WireError,
};

use crate::config::{Network, V1_ANY_NETWORK_CHAIN_ID};
use crate::payload::parse_items;
use crate::wc::{error_reply, InboundRpc, OutboundKind, Outbox};

#[derive(Debug, Clone, Default, Deserialize)]
struct V1PeerMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    icons: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V1SessionRequest {
    #[serde(default)]
    peer_meta: V1PeerMeta,
    #[serde(default)]
    chain_id: Option<u64>,
}

/// WalletConnect v1 bridge protocol: positional params, numeric chain ids.
#[derive(Debug, Clone)]
pub struct V1Adapter {
    network: Network,
    outbox: Outbox,
}

impl V1Adapter {
    pub(crate) fn new(network: Network, outbox: Outbox) -> Self {
        Self { network, outbox }
    }

    pub(crate) fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn chain_from_wire(&self, id: u64) -> ChainId {
        if id == V1_ANY_NETWORK_CHAIN_ID {
            return self.network.chain_id();
        }
        Network::from_v1_chain_id(id)
            .map(Network::chain_id)
            .unwrap_or_else(|| ChainId::new(format!("v1:{id}")))
    }

    pub fn parse_event(&self, topic: &str, raw: &str) -> Result<AdapterEvent, PortError> {
        let rpc = InboundRpc::parse(ProtocolVersion::V1, raw)?;
        match rpc.method.as_str() {
            "wc_sessionRequest" => self.parse_proposal(topic, rpc),
            "wc_sessionUpdate" => {
                let approved = rpc
                    .params
                    .get(0)
                    .and_then(|p| p.get("approved"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if approved {
                    Err(PortError::Validation(
                        "v1 session update from peer is not a disconnect".to_owned(),
                    ))
                } else {
                    Ok(AdapterEvent::PeerDisconnect {
                        topic: topic.to_owned(),
                    })
                }
            }
            _ => Ok(AdapterEvent::Request(self.parse_request(topic, rpc))),
        }
    }

    fn parse_proposal(&self, topic: &str, rpc: InboundRpc) -> Result<AdapterEvent, PortError> {
        let params = rpc.params.get(0).cloned().unwrap_or(Value::Null);
        let request: V1SessionRequest = serde_json::from_value(params)
            .map_err(|e| PortError::Validation(format!("v1 session request: {e}")))?;
        let chain = self.chain_from_wire(request.chain_id.unwrap_or(V1_ANY_NETWORK_CHAIN_ID));
        Ok(AdapterEvent::SessionProposal(SessionProposal {
            topic: topic.to_owned(),
            proposal_id: rpc.id,
            protocol_version: ProtocolVersion::V1,
            peer: PeerMetadata {
                name: request.peer_meta.name,
                url: request.peer_meta.url,
                description: request.peer_meta.description,
                icons: request.peer_meta.icons,
            },
            requested_chains: BTreeSet::from([chain]),
        }))
    }

    fn parse_request(&self, topic: &str, rpc: InboundRpc) -> RequestEnvelope {
        let method = RequestMethod::from_wire(&rpc.method);
        let parsed = parse_items(&method, &rpc.params);
        let chain_id = match parsed.chain_hint.as_ref().and_then(Value::as_u64) {
            Some(id) => self.chain_from_wire(id),
            None => self.network.chain_id(),
        };
        RequestEnvelope {
            request_id: rpc.id,
            topic: topic.to_owned(),
            protocol_version: ProtocolVersion::V1,
            method,
            chain_id,
            items: parsed.items,
            message: parsed.message,
        }
    }

    fn session_chain(&self, session: &Session) -> u64 {
        session
            .requested_chain_ids
            .iter()
            .find_map(Network::from_chain_id)
            .unwrap_or(self.network)
            .v1_chain_id()
    }

    fn account(session: &Session) -> Result<&str, PortError> {
        session
            .approved_account_address
            .as_deref()
            .ok_or_else(|| PortError::Validation(format!("session {} has no account", session.topic)))
    }

    pub fn approve_session(&self, session: &Session) -> Result<(), PortError> {
        let account = Self::account(session)?;
        self.outbox.send(
            ProtocolVersion::V1,
            &session.topic,
            OutboundKind::SessionApprove,
            json!({
                "id": session.proposal_id,
                "jsonrpc": "2.0",
                "result": {
                    "approved": true,
                    "chainId": self.session_chain(session),
                    "accounts": [account],
                },
            }),
        )
    }

    pub fn reject_session(&self, session: &Session, error: &WireError) -> Result<(), PortError> {
        self.outbox.send(
            ProtocolVersion::V1,
            &session.topic,
            OutboundKind::SessionReject,
            error_reply(session.proposal_id, error),
        )
    }

    pub fn update_session(&self, session: &Session) -> Result<(), PortError> {
        let account = Self::account(session)?;
        self.session_update(
            session,
            OutboundKind::SessionUpdate,
            json!({
                "approved": true,
                "chainId": self.session_chain(session),
                "accounts": [account],
            }),
        )
    }

    pub fn disconnect_session(&self, session: &Session) -> Result<(), PortError> {
        self.session_update(
            session,
            OutboundKind::SessionDelete,
            json!({ "approved": false, "chainId": null, "accounts": null }),
        )
    }

    fn session_update(
        &self,
        session: &Session,
        kind: OutboundKind,
        params: Value,
    ) -> Result<(), PortError> {
        self.outbox.send(
            ProtocolVersion::V1,
            &session.topic,
            kind,
            json!({
                "id": self.outbox.next_id(),
                "jsonrpc": "2.0",
                "method": "wc_sessionUpdate",
                "params": [params],
            }),
        )
    }
}
