pub mod coordinator;
pub mod domain;
pub mod error;
pub mod error_codes;
pub mod ports;
pub mod registry;
pub mod state_machine;
pub mod validator;

pub use coordinator::SessionCoordinator;
pub use domain::{
    AdapterEvent, ChainId, CoordinatorEvent, CoordinatorPolicy, ErrorReason, PayloadKind,
    PeerMetadata, ProtocolVersion, RejectionPayload, Request, RequestEnvelope, RequestItem,
    RequestKey, RequestMethod, RequestState, ResponseTarget, Session, SessionProposal,
    SessionState, SignedResponse, SweepReport, TimestampMs, TransitionLogRecord,
    ValidationResult, WalletAccount, WalletState, WireError,
};
pub use error::CoordinatorError;
pub use error_codes::ErrorCodeMapper;
pub use ports::{
    ClockPort, NetworkSubmitPort, PortError, PushSubscriptionPort, SignError, SigningPort,
    SubmitError, WalletConnectPort, WalletStatePort,
};
pub use registry::{SessionRegistry, SessionSort};
pub use state_machine::{
    request_transition, session_transition, RequestAction, SessionAction, StateTransition,
};
pub use validator::{is_valid_address, RequestValidator};
