pub mod clock;
pub mod config;
pub mod payload;
pub mod push;
pub mod submit;
pub mod sweeper;
pub mod v1;
pub mod v2;
pub mod wallet;
pub mod wc;

pub use clock::SystemClockAdapter;
pub use config::{Network, NetworkConfig, WalletConnectConfig, V1_ANY_NETWORK_CHAIN_ID};
pub use push::PushSubscriptionAdapter;
pub use submit::AlgodSubmitAdapter;
pub use sweeper::spawn_expiry_sweeper;
pub use v1::V1Adapter;
pub use v2::V2Adapter;
pub use wallet::WalletAccountsAdapter;
pub use wc::{OutboundKind, OutboundMessage, ProtocolAdapter, WalletConnectAdapter};
