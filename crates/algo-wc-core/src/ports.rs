use std::future::Future;

use alloy::primitives::Bytes;
use thiserror::Error;

use crate::domain::{ErrorReason, ResponseTarget, Session, SignedResponse, WalletState, WireError};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signing rejected on device: {0}")]
    Rejected(String),
    #[error("invalid asset: {0}")]
    InvalidAsset(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("signing device error: {0}")]
    Device(String),
}

impl SignError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::Rejected(_) => ErrorReason::UserRejected,
            Self::InvalidAsset(_) => ErrorReason::InvalidAsset,
            Self::Malformed(_) => ErrorReason::MalformedPayload,
            Self::Device(_) => ErrorReason::SigningFailed,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("network rejected transaction: {0}")]
    Rejected(String),
    #[error("submit transport error: {0}")]
    Transport(String),
}

/// Produces signatures for payloads. May suspend on hardware-device I/O.
pub trait SigningPort: Send + Sync {
    fn sign(
        &self,
        payload: &[u8],
        signer_address: &str,
    ) -> impl Future<Output = Result<Bytes, SignError>> + Send;
}

/// Posts signed transactions to the network and returns the transaction id.
pub trait NetworkSubmitPort: Send + Sync {
    fn submit(&self, signed_payload: &[u8])
        -> impl Future<Output = Result<String, SubmitError>> + Send;
}

pub trait PushSubscriptionPort: Send + Sync {
    fn subscribe(
        &self,
        session: &Session,
        push_token: &str,
    ) -> impl Future<Output = Result<(), PortError>> + Send;
}

/// Outbound half of the WalletConnect transports. Implementations encode the
/// version-specific wire format.
pub trait WalletConnectPort: Send + Sync {
    fn approve_session(&self, session: &Session) -> Result<(), PortError>;
    fn reject_session(&self, session: &Session, error: &WireError) -> Result<(), PortError>;
    fn update_session(&self, session: &Session) -> Result<(), PortError>;
    fn disconnect_session(&self, session: &Session) -> Result<(), PortError>;
    fn respond_success(
        &self,
        target: &ResponseTarget,
        response: &SignedResponse,
    ) -> Result<(), PortError>;
    fn respond_error(&self, target: &ResponseTarget, error: &WireError) -> Result<(), PortError>;
}

pub trait WalletStatePort: Send + Sync {
    fn snapshot(&self) -> Result<WalletState, PortError>;
}

pub trait ClockPort: Send + Sync {
    fn now_ms(&self) -> Result<u64, PortError>;
}
