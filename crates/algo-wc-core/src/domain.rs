use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use alloy::primitives::{keccak256, Bytes, B256};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimestampMs(pub u64);

impl TimestampMs {
    pub fn saturating_add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    V1,
    V2,
}

/// Canonical network name a session or request is bound to (`mainnet`, `testnet`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl ChainId {
    pub const MAINNET: &'static str = "mainnet";
    pub const TESTNET: &'static str = "testnet";
    pub const BETANET: &'static str = "betanet";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetadata {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub icons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProposal {
    pub topic: String,
    /// JSON-RPC id of the proposal message; the approve/reject reply is addressed to it.
    pub proposal_id: u64,
    pub protocol_version: ProtocolVersion,
    pub peer: PeerMetadata,
    pub requested_chains: BTreeSet<ChainId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Proposed,
    Approved,
    Rejected,
    Active,
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Disconnected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub topic: String,
    pub proposal_id: u64,
    pub protocol_version: ProtocolVersion,
    pub peer_name: String,
    pub peer_url: String,
    pub peer_description: Option<String>,
    pub peer_icons: Vec<String>,
    /// Set only while the session is `Active`.
    pub approved_account_address: Option<String>,
    pub requested_chain_ids: BTreeSet<ChainId>,
    pub is_subscribed_for_push: bool,
    pub state: SessionState,
    pub proposed_at_ms: TimestampMs,
    pub approved_at_ms: Option<TimestampMs>,
    pub expires_at_ms: Option<TimestampMs>,
}

impl Session {
    pub fn from_proposal(proposal: SessionProposal, now: TimestampMs) -> Self {
        Self {
            topic: proposal.topic,
            proposal_id: proposal.proposal_id,
            protocol_version: proposal.protocol_version,
            peer_name: proposal.peer.name,
            peer_url: proposal.peer.url,
            peer_description: proposal.peer.description,
            peer_icons: proposal.peer.icons,
            approved_account_address: None,
            requested_chain_ids: proposal.requested_chains,
            is_subscribed_for_push: false,
            state: SessionState::Proposed,
            proposed_at_ms: now,
            approved_at_ms: None,
            expires_at_ms: None,
        }
    }

    pub fn flow_id(&self) -> String {
        format!("session:{}", self.topic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestMethod {
    /// `algo_signTxn`
    SignTransaction,
    /// `algo_signData`
    SignData,
    Unsupported(String),
}

impl RequestMethod {
    pub fn from_wire(method: &str) -> Self {
        match method {
            "algo_signTxn" => Self::SignTransaction,
            "algo_signData" => Self::SignData,
            other => Self::Unsupported(other.to_owned()),
        }
    }

    pub fn wire_name(&self) -> &str {
        match self {
            Self::SignTransaction => "algo_signTxn",
            Self::SignData => "algo_signData",
            Self::Unsupported(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    SingleTransaction,
    GroupTransaction,
    ArbitraryData,
}

impl PayloadKind {
    pub fn is_transaction(self) -> bool {
        matches!(self, Self::SingleTransaction | Self::GroupTransaction)
    }
}

/// One unit of signing work inside a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub payload: Bytes,
    pub signer: Option<String>,
    /// `false` for group members the dApp only supplies for reference.
    pub sign: bool,
}

/// Version-agnostic request as normalized by a protocol adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: u64,
    pub topic: String,
    pub protocol_version: ProtocolVersion,
    pub method: RequestMethod,
    pub chain_id: ChainId,
    pub items: Vec<RequestItem>,
    pub message: Option<String>,
}

impl RequestEnvelope {
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        match self.method {
            RequestMethod::SignTransaction if self.items.len() > 1 => {
                Some(PayloadKind::GroupTransaction)
            }
            RequestMethod::SignTransaction => Some(PayloadKind::SingleTransaction),
            RequestMethod::SignData => Some(PayloadKind::ArbitraryData),
            RequestMethod::Unsupported(_) => None,
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.topic.clone(), self.request_id)
    }

    pub fn target(&self) -> ResponseTarget {
        ResponseTarget {
            protocol_version: self.protocol_version,
            topic: self.topic.clone(),
            request_id: self.request_id,
        }
    }
}

/// Identity of a request. dApps number their JSON-RPC ids per session, so the
/// id alone is only unique within one topic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub topic: String,
    pub request_id: u64,
}

impl RequestKey {
    pub fn new(topic: impl Into<String>, request_id: u64) -> Self {
        Self {
            topic: topic.into(),
            request_id,
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.topic, self.request_id)
    }
}

/// Where a request response is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseTarget {
    pub protocol_version: ProtocolVersion,
    pub topic: String,
    pub request_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    Received,
    Validating,
    Invalid,
    Valid,
    AwaitingUserDecision,
    UserRejected,
    UserApproved,
    Signing,
    SignFailed,
    Signed,
    Submitting,
    SubmitFailed,
    Submitted,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Invalid
                | Self::UserRejected
                | Self::SignFailed
                | Self::SubmitFailed
                | Self::Submitted
                | Self::Cancelled
        )
    }

    /// Owned by an in-progress `decide_request` call.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::UserApproved | Self::Signing | Self::Signed | Self::Submitting
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    Valid,
    Invalid(ErrorReason),
}

impl ValidationResult {
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn reason(self) -> Option<ErrorReason> {
        match self {
            Self::Valid => None,
            Self::Invalid(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: u64,
    pub session_topic: String,
    pub protocol_version: ProtocolVersion,
    pub payload_kind: PayloadKind,
    pub requested_signer_address: Option<String>,
    pub chain_id: ChainId,
    pub items: Vec<RequestItem>,
    pub raw_payload: Bytes,
    pub payload_digest: B256,
    pub message: Option<String>,
    pub validation_result: Option<ValidationResult>,
    pub state: RequestState,
    pub failure: Option<ErrorReason>,
    pub transaction_id: Option<String>,
    pub received_at_ms: TimestampMs,
    /// Set when the request is surfaced for a user decision.
    pub expires_at_ms: Option<TimestampMs>,
}

impl Request {
    pub fn from_envelope(
        envelope: RequestEnvelope,
        payload_kind: PayloadKind,
        now: TimestampMs,
    ) -> Self {
        let raw: Vec<u8> = envelope
            .items
            .iter()
            .flat_map(|item| item.payload.iter().copied())
            .collect();
        let requested_signer_address = envelope.items.iter().find_map(|i| i.signer.clone());
        Self {
            request_id: envelope.request_id,
            session_topic: envelope.topic,
            protocol_version: envelope.protocol_version,
            payload_kind,
            requested_signer_address,
            chain_id: envelope.chain_id,
            items: envelope.items,
            payload_digest: keccak256(&raw),
            raw_payload: Bytes::from(raw),
            message: envelope.message,
            validation_result: None,
            state: RequestState::Received,
            failure: None,
            transaction_id: None,
            received_at_ms: now,
            expires_at_ms: None,
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.session_topic.clone(), self.request_id)
    }

    pub fn flow_id(&self) -> String {
        format!("request:{}:{}", self.session_topic, self.request_id)
    }

    pub fn target(&self) -> ResponseTarget {
        ResponseTarget {
            protocol_version: self.protocol_version,
            topic: self.session_topic.clone(),
            request_id: self.request_id,
        }
    }

    pub fn signable_items(&self) -> impl Iterator<Item = &RequestItem> {
        self.items.iter().filter(|item| item.sign)
    }
}

/// Abstract, protocol-agnostic failure cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    UserRejected,
    SessionNotFound,
    RequestExpired,
    TooManyPendingRequests,
    UnauthorizedChain,
    MissingSigner,
    UnauthorizedMethod,
    InvalidPublicKey,
    Unsupported,
    UnsupportedMethod,
    InvalidAsset,
    MaxTransactionLimit,
    MaxArbitraryDataLimit,
    MalformedPayload,
    SigningFailed,
    SubmitFailed,
}

impl ErrorReason {
    pub const ALL: [ErrorReason; 16] = [
        Self::UserRejected,
        Self::SessionNotFound,
        Self::RequestExpired,
        Self::TooManyPendingRequests,
        Self::UnauthorizedChain,
        Self::MissingSigner,
        Self::UnauthorizedMethod,
        Self::InvalidPublicKey,
        Self::Unsupported,
        Self::UnsupportedMethod,
        Self::InvalidAsset,
        Self::MaxTransactionLimit,
        Self::MaxArbitraryDataLimit,
        Self::MalformedPayload,
        Self::SigningFailed,
        Self::SubmitFailed,
    ];

    pub fn description(self) -> &'static str {
        match self {
            Self::UserRejected => "The request was rejected by the user.",
            Self::SessionNotFound => "The session for this request no longer exists.",
            Self::RequestExpired => "The request expired before the user responded.",
            Self::TooManyPendingRequests => "Too many pending requests.",
            Self::UnauthorizedChain => "The requested network is not authorized for this session.",
            Self::MissingSigner => "The wallet does not hold the requested signer account.",
            Self::UnauthorizedMethod => "The signer is not managed by this wallet.",
            Self::InvalidPublicKey => "The signer address is not a valid public key.",
            Self::Unsupported => "The signing account does not support this request.",
            Self::UnsupportedMethod => "The requested method is not supported.",
            Self::InvalidAsset => "The request references an unknown asset.",
            Self::MaxTransactionLimit => "The request exceeds the transaction limit.",
            Self::MaxArbitraryDataLimit => "The request exceeds the arbitrary data limit.",
            Self::MalformedPayload => "The request payload is malformed.",
            Self::SigningFailed => "The payload could not be signed.",
            Self::SubmitFailed => "The signed payload could not be submitted.",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Structured rejection object used by the version 2 protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionPayload {
    pub code: i64,
    pub message: String,
}

/// Protocol-encoded error ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireError {
    V1 { code: i64, message: String },
    V2(RejectionPayload),
}

impl WireError {
    pub fn code(&self) -> i64 {
        match self {
            Self::V1 { code, .. } => *code,
            Self::V2(payload) => payload.code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::V1 { message, .. } => message,
            Self::V2(payload) => &payload.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedResponse {
    /// One entry per request item, `None` for items the wallet does not sign.
    pub signatures: Vec<Option<Bytes>>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub address: String,
    /// Rekeyed accounts are signed for by their auth account.
    pub auth_address: Option<String>,
    pub requires_hardware: bool,
    pub watch_only: bool,
}

impl WalletAccount {
    pub fn software(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            auth_address: None,
            requires_hardware: false,
            watch_only: false,
        }
    }

    pub fn resolved_signer(&self) -> &str {
        self.auth_address.as_deref().unwrap_or(&self.address)
    }
}

/// Snapshot of the wallet the validator checks requests against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub allowed_chains: BTreeSet<ChainId>,
    pub accounts: BTreeMap<String, WalletAccount>,
}

impl WalletState {
    pub fn with_chain(mut self, chain: ChainId) -> Self {
        self.allowed_chains.insert(chain);
        self
    }

    pub fn with_account(mut self, account: WalletAccount) -> Self {
        self.accounts.insert(account.address.clone(), account);
        self
    }

    pub fn account(&self, address: &str) -> Option<&WalletAccount> {
        self.accounts.get(address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionLogRecord {
    pub event_seq: u64,
    pub flow_id: String,
    pub state_before: String,
    pub state_after: String,
    pub reason: Option<String>,
    pub recorded_at_ms: TimestampMs,
}

/// Normalized inbound event delivered by a protocol adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    SessionProposal(SessionProposal),
    Request(RequestEnvelope),
    PeerDisconnect { topic: String },
}

/// Notification for the UI layer. Each event is consumed once by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    SessionProposed(Session),
    SessionActivated(Session),
    SessionRejected(Session),
    SessionUpdated(Session),
    SessionDisconnected(Session),
    RequestAwaitingDecision(Request),
    RequestFinished(Request),
}

#[derive(Debug, Clone)]
pub struct CoordinatorPolicy {
    pub request_timeout_ms: u64,
    pub session_ttl_ms: u64,
    pub max_transactions_per_request: usize,
    pub max_arbitrary_data_per_signer: usize,
    pub max_pending_requests_per_session: usize,
    pub submit_transactions: bool,
    /// Transition logs kept for flows that already finished; older ones are evicted.
    pub retained_flow_logs: usize,
}

impl Default for CoordinatorPolicy {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5 * 60 * 1000,
            session_ttl_ms: 7 * 24 * 60 * 60 * 1000,
            max_transactions_per_request: 1_000,
            max_arbitrary_data_per_signer: 1_000,
            max_pending_requests_per_session: 64,
            submit_transactions: false,
            retained_flow_logs: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_requests: Vec<RequestKey>,
    pub expired_sessions: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_requests.is_empty() && self.expired_sessions.is_empty()
    }
}
