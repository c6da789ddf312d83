use serde::{Deserialize, Serialize};

use algo_wc_core::{ChainId, CoordinatorPolicy, PortError};

/// WalletConnect v1 chain id accepted on every network.
pub const V1_ANY_NETWORK_CHAIN_ID: u64 = 4160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Betanet,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Testnet, Network::Betanet];

    pub fn chain_id(self) -> ChainId {
        ChainId::new(match self {
            Self::Mainnet => ChainId::MAINNET,
            Self::Testnet => ChainId::TESTNET,
            Self::Betanet => ChainId::BETANET,
        })
    }

    pub fn v1_chain_id(self) -> u64 {
        match self {
            Self::Mainnet => 416_001,
            Self::Testnet => 416_002,
            Self::Betanet => 416_003,
        }
    }

    /// CAIP-2 reference: the first 32 characters of the base64url genesis hash.
    pub fn caip2_reference(self) -> &'static str {
        match self {
            Self::Mainnet => "wGHE2Pwdvd7S12BL5FaOP20EGYesN73k",
            Self::Testnet => "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDe",
            Self::Betanet => "mFgazF-2uRS1tMiL9dsj01hJGySEmPN2",
        }
    }

    pub fn caip2_chain(self) -> String {
        format!("algorand:{}", self.caip2_reference())
    }

    pub fn from_chain_id(chain: &ChainId) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.chain_id() == *chain)
    }

    pub fn from_v1_chain_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.v1_chain_id() == id)
    }

    pub fn from_caip2(chain: &str) -> Option<Self> {
        let reference = chain.strip_prefix("algorand:")?;
        Self::ALL
            .into_iter()
            .find(|n| n.caip2_reference() == reference)
    }
}

/// Process-wide network configuration owned by the application context and
/// handed to every collaborator that talks to the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub network: Network,
    pub algod_url: String,
    pub algod_token: Option<String>,
    pub push_backend_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            algod_url: "https://mainnet-api.algonode.cloud".to_owned(),
            algod_token: None,
            push_backend_url: "https://mainnet.api.perawallet.app".to_owned(),
        }
    }
}

impl NetworkConfig {
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            algod_url: "https://testnet-api.algonode.cloud".to_owned(),
            algod_token: None,
            push_backend_url: "https://testnet.api.perawallet.app".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConnectConfig {
    pub network: NetworkConfig,
    pub http_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub session_ttl_ms: u64,
    pub max_transactions_per_request: usize,
    pub max_arbitrary_data_per_signer: usize,
    pub max_pending_requests_per_session: usize,
    pub submit_transactions: bool,
    pub retained_flow_logs: usize,
}

impl Default for WalletConnectConfig {
    fn default() -> Self {
        let policy = CoordinatorPolicy::default();
        Self {
            network: NetworkConfig::default(),
            http_timeout_ms: 15_000,
            sweep_interval_ms: 1_000,
            request_timeout_ms: policy.request_timeout_ms,
            session_ttl_ms: policy.session_ttl_ms,
            max_transactions_per_request: policy.max_transactions_per_request,
            max_arbitrary_data_per_signer: policy.max_arbitrary_data_per_signer,
            max_pending_requests_per_session: policy.max_pending_requests_per_session,
            submit_transactions: policy.submit_transactions,
            retained_flow_logs: policy.retained_flow_logs,
        }
    }
}

impl WalletConnectConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, PortError> {
        serde_json::from_str(raw).map_err(|e| PortError::Validation(format!("invalid config: {e}")))
    }

    pub fn policy(&self) -> CoordinatorPolicy {
        CoordinatorPolicy {
            request_timeout_ms: self.request_timeout_ms,
            session_ttl_ms: self.session_ttl_ms,
            max_transactions_per_request: self.max_transactions_per_request,
            max_arbitrary_data_per_signer: self.max_arbitrary_data_per_signer,
            max_pending_requests_per_session: self.max_pending_requests_per_session,
            submit_transactions: self.submit_transactions,
            retained_flow_logs: self.retained_flow_logs,
        }
    }
}
