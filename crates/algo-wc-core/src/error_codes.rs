use crate::domain::{ErrorReason, ProtocolVersion, RejectionPayload, WireError};

pub const V1_REJECTED: i64 = 4100;
pub const V1_UNSUPPORTED: i64 = 4200;
pub const V1_INVALID_INPUT: i64 = 4300;

pub const V2_INVALID_REQUEST: i64 = 1001;
pub const V2_UNAUTHORIZED_METHOD: i64 = 3001;
pub const V2_USER_REJECTED: i64 = 5000;
pub const V2_UNSUPPORTED_CHAINS: i64 = 5100;
pub const V2_UNSUPPORTED_METHODS: i64 = 5101;
pub const V2_USER_DISCONNECTED: i64 = 6000;
pub const V2_REQUEST_EXPIRED: i64 = 8000;

/// Maps abstract failure reasons to protocol wire errors. The matches carry no
/// wildcard arm, so every new `ErrorReason` needs a code here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorCodeMapper;

impl ErrorCodeMapper {
    pub fn map_v1(reason: ErrorReason) -> i64 {
        match reason {
            ErrorReason::UserRejected
            | ErrorReason::SessionNotFound
            | ErrorReason::RequestExpired
            | ErrorReason::TooManyPendingRequests
            | ErrorReason::UnauthorizedChain
            | ErrorReason::MissingSigner
            | ErrorReason::UnauthorizedMethod
            | ErrorReason::InvalidPublicKey
            | ErrorReason::SigningFailed
            | ErrorReason::SubmitFailed => V1_REJECTED,
            ErrorReason::Unsupported | ErrorReason::UnsupportedMethod => V1_UNSUPPORTED,
            ErrorReason::InvalidAsset
            | ErrorReason::MaxTransactionLimit
            | ErrorReason::MaxArbitraryDataLimit
            | ErrorReason::MalformedPayload => V1_INVALID_INPUT,
        }
    }

    pub fn map_v2(reason: ErrorReason) -> RejectionPayload {
        let code = match reason {
            ErrorReason::UserRejected
            | ErrorReason::TooManyPendingRequests
            | ErrorReason::SigningFailed
            | ErrorReason::SubmitFailed => V2_USER_REJECTED,
            ErrorReason::SessionNotFound => V2_USER_DISCONNECTED,
            ErrorReason::RequestExpired => V2_REQUEST_EXPIRED,
            ErrorReason::UnauthorizedChain => V2_UNSUPPORTED_CHAINS,
            ErrorReason::MissingSigner
            | ErrorReason::UnauthorizedMethod
            | ErrorReason::InvalidPublicKey => V2_UNAUTHORIZED_METHOD,
            ErrorReason::Unsupported | ErrorReason::UnsupportedMethod => V2_UNSUPPORTED_METHODS,
            ErrorReason::InvalidAsset
            | ErrorReason::MaxTransactionLimit
            | ErrorReason::MaxArbitraryDataLimit
            | ErrorReason::MalformedPayload => V2_INVALID_REQUEST,
        };
        RejectionPayload {
            code,
            message: reason.description().to_owned(),
        }
    }

    pub fn map(version: ProtocolVersion, reason: ErrorReason) -> WireError {
        match version {
            ProtocolVersion::V1 => WireError::V1 {
                code: Self::map_v1(reason),
                message: reason.description().to_owned(),
            },
            ProtocolVersion::V2 => WireError::V2(Self::map_v2(reason)),
        }
    }
}
