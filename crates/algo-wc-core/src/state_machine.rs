use crate::domain::{RequestState, SessionState};
use crate::error::CoordinatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Approve,
    Reject,
    Activate,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Validate,
    Pass,
    Fail,
    Surface,
    Reject,
    Approve,
    StartSigning,
    SignFailure,
    SignSuccess,
    StartSubmitting,
    SubmitFailure,
    SubmitSuccess,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition<S> {
    pub from: S,
    pub to: S,
    pub reason: &'static str,
}

pub fn session_transition(
    state: SessionState,
    action: SessionAction,
) -> Result<(SessionState, StateTransition<SessionState>), CoordinatorError> {
    use SessionAction as A;
    use SessionState as S;

    let (to, reason) = match (state, action) {
        (S::Proposed, A::Approve) => (S::Approved, "session_approved"),
        (S::Proposed, A::Reject) => (S::Rejected, "session_rejected"),
        (S::Approved, A::Activate) => (S::Active, "session_activated"),
        (S::Active, A::Disconnect) => (S::Disconnected, "session_disconnected"),
        _ => {
            return Err(CoordinatorError::InvalidState(format!(
                "illegal session transition: {state:?} via {action:?}"
            )))
        }
    };
    Ok((
        to,
        StateTransition {
            from: state,
            to,
            reason,
        },
    ))
}

pub fn request_transition(
    state: RequestState,
    action: RequestAction,
) -> Result<(RequestState, StateTransition<RequestState>), CoordinatorError> {
    use RequestAction as A;
    use RequestState as S;

    let (to, reason) = match (state, action) {
        (S::Received, A::Validate) => (S::Validating, "validation_started"),
        (S::Validating, A::Fail) => (S::Invalid, "validation_failed"),
        (S::Validating, A::Pass) => (S::Valid, "validation_passed"),
        (S::Valid, A::Surface) => (S::AwaitingUserDecision, "surfaced_to_user"),
        (S::AwaitingUserDecision, A::Reject) => (S::UserRejected, "user_rejected"),
        (S::AwaitingUserDecision, A::Approve) => (S::UserApproved, "user_approved"),
        (S::UserApproved, A::StartSigning) => (S::Signing, "signing_started"),
        (S::Signing, A::SignFailure) => (S::SignFailed, "signing_failed"),
        (S::Signing, A::SignSuccess) => (S::Signed, "signed"),
        (S::Signed, A::StartSubmitting) => (S::Submitting, "submitting"),
        (S::Submitting, A::SubmitFailure) => (S::SubmitFailed, "submit_failed"),
        (S::Submitting, A::SubmitSuccess) => (S::Submitted, "submitted"),
        (from, A::Cancel) if !from.is_terminal() => (S::Cancelled, "cancelled"),
        _ => {
            return Err(CoordinatorError::InvalidState(format!(
                "illegal request transition: {state:?} via {action:?}"
            )))
        }
    };
    Ok((
        to,
        StateTransition {
            from: state,
            to,
            reason,
        },
    ))
}
