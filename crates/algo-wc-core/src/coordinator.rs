use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{
    AdapterEvent, CoordinatorEvent, CoordinatorPolicy, ErrorReason, ProtocolVersion, Request,
    RequestEnvelope, RequestKey, RequestState, ResponseTarget, Session, SessionProposal,
    SessionState, SignedResponse, SweepReport, TimestampMs, TransitionLogRecord,
    ValidationResult,
};
use crate::error::{poisoned, CoordinatorError};
use crate::error_codes::ErrorCodeMapper;
use crate::ports::{
    ClockPort, NetworkSubmitPort, PortError, PushSubscriptionPort, SigningPort, WalletConnectPort,
    WalletStatePort,
};
use crate::registry::SessionRegistry;
use crate::state_machine::{
    request_transition, session_transition, RequestAction, SessionAction,
};
use crate::validator::RequestValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectOrigin {
    Wallet,
    Peer,
    Expiry,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    proposals: HashMap<String, Session>,
    requests: HashMap<RequestKey, Request>,
    /// Per-session FIFO of request ids waiting for (or holding) the user's attention.
    queues: HashMap<String, VecDeque<u64>>,
    logs: HashMap<String, Vec<TransitionLogRecord>>,
    /// Flows that reached a terminal state, oldest first.
    finished_flows: VecDeque<String>,
}

/// Owns session and request lifecycles and is the only writer of the
/// [`SessionRegistry`].
///
/// All public operations may be called from any thread. Mutations are
/// serialized through one internal lock which is never held across an await.
pub struct SessionCoordinator<W, S, N, P, A, C>
where
    W: WalletConnectPort,
    S: SigningPort,
    N: NetworkSubmitPort,
    P: PushSubscriptionPort,
    A: WalletStatePort,
    C: ClockPort,
{
    pub walletconnect: W,
    pub signer: S,
    pub submitter: N,
    pub push: P,
    pub wallet: A,
    pub clock: C,
    policy: CoordinatorPolicy,
    validator: RequestValidator,
    registry: SessionRegistry,
    state: Mutex<CoordinatorState>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl<W, S, N, P, A, C> SessionCoordinator<W, S, N, P, A, C>
where
    W: WalletConnectPort,
    S: SigningPort,
    N: NetworkSubmitPort,
    P: PushSubscriptionPort,
    A: WalletStatePort,
    C: ClockPort,
{
    pub fn new(
        walletconnect: W,
        signer: S,
        submitter: N,
        push: P,
        wallet: A,
        clock: C,
        policy: CoordinatorPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<CoordinatorEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let coordinator = Self {
            walletconnect,
            signer,
            submitter,
            push,
            wallet,
            clock,
            validator: RequestValidator::from_policy(&policy),
            policy,
            registry: SessionRegistry::default(),
            state: Mutex::new(CoordinatorState::default()),
            events,
        };
        (coordinator, receiver)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &CoordinatorPolicy {
        &self.policy
    }

    pub fn handle_event(&self, event: AdapterEvent) -> Result<(), CoordinatorError> {
        match event {
            AdapterEvent::SessionProposal(proposal) => self.propose_session(proposal).map(|_| ()),
            AdapterEvent::Request(envelope) => self.receive_request(envelope).map(|_| ()),
            AdapterEvent::PeerDisconnect { topic } => self.handle_peer_disconnect(&topic),
        }
    }

    pub fn propose_session(&self, proposal: SessionProposal) -> Result<Session, CoordinatorError> {
        let now = self.now()?;
        let mut state = self.lock()?;
        if state.proposals.contains_key(&proposal.topic) || self.registry.contains(&proposal.topic)?
        {
            return Err(CoordinatorError::DuplicateTopic(proposal.topic));
        }
        let session = Session::from_proposal(proposal, now);
        self.start_flow(&mut state, &session.flow_id());
        self.record(
            &mut state,
            session.flow_id(),
            "None",
            format!("{:?}", session.state),
            None,
            now,
        );
        state
            .proposals
            .insert(session.topic.clone(), session.clone());
        info!(
            topic = %session.topic,
            version = ?session.protocol_version,
            peer = %session.peer_name,
            "session proposed"
        );
        self.publish(CoordinatorEvent::SessionProposed(session.clone()));
        Ok(session)
    }

    pub fn decide_session(
        &self,
        topic: &str,
        approve: bool,
        account_address: Option<&str>,
    ) -> Result<Session, CoordinatorError> {
        let now = self.now()?;
        let mut state = self.lock()?;
        if self.registry.contains(topic)? {
            return Err(CoordinatorError::InvalidState(format!(
                "session {topic} is not awaiting a decision"
            )));
        }
        let mut session = state
            .proposals
            .get(topic)
            .cloned()
            .ok_or_else(|| CoordinatorError::SessionNotFound(topic.to_owned()))?;

        if !approve {
            state.proposals.remove(topic);
            self.apply_session(&mut state, &mut session, SessionAction::Reject, now)?;
            self.finish_flow(&mut state, session.flow_id());
            let error = ErrorCodeMapper::map(session.protocol_version, ErrorReason::UserRejected);
            if let Err(e) = self.walletconnect.reject_session(&session, &error) {
                warn!(topic, error = %e, "failed to emit session rejection");
            }
            self.publish(CoordinatorEvent::SessionRejected(session.clone()));
            return Ok(session);
        }

        let account = account_address.ok_or_else(|| {
            CoordinatorError::InvalidInput("approving a session requires an account".to_owned())
        })?;
        let wallet = self.wallet.snapshot()?;
        if wallet.account(account).is_none() {
            return Err(CoordinatorError::InvalidInput(format!(
                "account {account} is not held by this wallet"
            )));
        }

        let mut approved = session.clone();
        approved.approved_account_address = Some(account.to_owned());
        approved.approved_at_ms = Some(now);
        approved.expires_at_ms = Some(now.saturating_add_ms(self.policy.session_ttl_ms));
        // Nothing is committed until the peer has been told.
        self.walletconnect.approve_session(&approved)?;

        state.proposals.remove(topic);
        session = approved;
        self.apply_session(&mut state, &mut session, SessionAction::Approve, now)?;
        self.apply_session(&mut state, &mut session, SessionAction::Activate, now)?;
        self.registry.insert(session.clone())?;
        info!(topic, account, "session active");
        self.publish(CoordinatorEvent::SessionActivated(session.clone()));
        Ok(session)
    }

    pub fn update_session_account(
        &self,
        topic: &str,
        account_address: &str,
    ) -> Result<Session, CoordinatorError> {
        let _state = self.lock()?;
        let mut session = self
            .registry
            .find(topic)?
            .ok_or_else(|| CoordinatorError::SessionNotFound(topic.to_owned()))?;
        if session.state != SessionState::Active {
            return Err(CoordinatorError::InvalidState(format!(
                "session {topic} is {:?}",
                session.state
            )));
        }
        let wallet = self.wallet.snapshot()?;
        if wallet.account(account_address).is_none() {
            return Err(CoordinatorError::InvalidInput(format!(
                "account {account_address} is not held by this wallet"
            )));
        }
        session.approved_account_address = Some(account_address.to_owned());
        self.walletconnect.update_session(&session)?;
        self.registry.replace(session.clone())?;
        info!(topic, account = account_address, "session account switched");
        self.publish(CoordinatorEvent::SessionUpdated(session.clone()));
        Ok(session)
    }

    pub async fn subscribe_for_push(
        &self,
        topic: &str,
        push_token: &str,
    ) -> Result<Session, CoordinatorError> {
        let session = self
            .registry
            .find(topic)?
            .ok_or_else(|| CoordinatorError::SessionNotFound(topic.to_owned()))?;
        if session.is_subscribed_for_push {
            return Ok(session);
        }
        match session.protocol_version {
            ProtocolVersion::V1 => self.push.subscribe(&session, push_token).await?,
            ProtocolVersion::V2 => {
                return Err(PortError::NotImplemented("push subscription for v2 sessions").into())
            }
        }

        let _state = self.lock()?;
        let mut current = self
            .registry
            .find(topic)?
            .ok_or_else(|| CoordinatorError::SessionNotFound(topic.to_owned()))?;
        current.is_subscribed_for_push = true;
        self.registry.replace(current.clone())?;
        debug!(topic, "session subscribed for push");
        Ok(current)
    }

    pub fn receive_request(&self, envelope: RequestEnvelope) -> Result<Request, CoordinatorError> {
        let now = self.now()?;
        let mut state = self.lock()?;

        let target = envelope.target();
        let key = envelope.key();
        let Some(session) = self.registry.find(&envelope.topic)? else {
            warn!(topic = %envelope.topic, request_id = envelope.request_id, "request for unknown session");
            self.emit_error(&target, ErrorReason::SessionNotFound);
            return Err(CoordinatorError::SessionNotFound(envelope.topic));
        };
        if state.requests.contains_key(&key) {
            warn!(request = %key, "duplicate request id ignored");
            return Err(CoordinatorError::DuplicateRequest(key));
        }
        let Some(kind) = envelope.payload_kind() else {
            let method = envelope.method.wire_name().to_owned();
            warn!(request_id = envelope.request_id, method = %method, "unsupported method");
            self.emit_error(&target, ErrorReason::UnsupportedMethod);
            return Err(CoordinatorError::UnsupportedMethod(method));
        };

        let mut request = Request::from_envelope(envelope, kind, now);
        self.start_flow(&mut state, &request.flow_id());
        self.record(
            &mut state,
            request.flow_id(),
            "None",
            format!("{:?}", request.state),
            None,
            now,
        );
        self.apply_request(&mut state, &mut request, RequestAction::Validate, now)?;

        let queued = state.queues.get(&request.session_topic).map_or(0, VecDeque::len);
        let validation = if queued >= self.policy.max_pending_requests_per_session {
            ValidationResult::Invalid(ErrorReason::TooManyPendingRequests)
        } else {
            match self.wallet.snapshot() {
                Ok(wallet) => self.validator.validate(&request, &session, &wallet),
                Err(e) => {
                    warn!(request_id = request.request_id, error = %e, "wallet state unavailable");
                    ValidationResult::Invalid(ErrorReason::MissingSigner)
                }
            }
        };
        request.validation_result = Some(validation);

        if let ValidationResult::Invalid(reason) = validation {
            info!(
                request_id = request.request_id,
                topic = %request.session_topic,
                reason = ?reason,
                "request failed validation"
            );
            self.finish_with_error(&mut state, &mut request, RequestAction::Fail, reason, now)?;
            return Ok(request);
        }

        self.apply_request(&mut state, &mut request, RequestAction::Pass, now)?;
        debug!(
            request_id = request.request_id,
            digest = %request.payload_digest,
            "request validated"
        );
        let topic = request.session_topic.clone();
        state
            .queues
            .entry(topic.clone())
            .or_default()
            .push_back(request.request_id);
        state.requests.insert(key.clone(), request.clone());
        self.promote_next(&mut state, &topic, now)?;
        Ok(state.requests.get(&key).cloned().unwrap_or(request))
    }

    pub async fn decide_request(
        &self,
        topic: &str,
        request_id: u64,
        approve: bool,
    ) -> Result<Request, CoordinatorError> {
        let key = RequestKey::new(topic, request_id);
        let (mut request, session) = {
            let now = self.now()?;
            let mut state = self.lock()?;
            let mut request = state
                .requests
                .get(&key)
                .cloned()
                .ok_or_else(|| CoordinatorError::RequestNotFound(key.clone()))?;
            match request.state {
                RequestState::AwaitingUserDecision => {}
                current if current.is_in_flight() || current.is_terminal() => {
                    warn!(request = %key, state = ?current, "decision for request already being settled");
                    return Err(CoordinatorError::InvalidState(format!(
                        "request {key} is {current:?}"
                    )));
                }
                current => {
                    // Out-of-order decision: the request is rejected rather than left queued.
                    warn!(request = %key, state = ?current, "decision for request not surfaced yet");
                    self.release(&mut state, &request);
                    self.finish_with_error(
                        &mut state,
                        &mut request,
                        RequestAction::Cancel,
                        ErrorReason::UserRejected,
                        now,
                    )?;
                    self.promote_next(&mut state, topic, now)?;
                    return Err(CoordinatorError::InvalidState(format!(
                        "request {key} was {current:?} when decided"
                    )));
                }
            }
            if request.expires_at_ms.is_some_and(|at| now >= at) {
                self.release(&mut state, &request);
                self.finish_with_error(
                    &mut state,
                    &mut request,
                    RequestAction::Cancel,
                    ErrorReason::RequestExpired,
                    now,
                )?;
                self.promote_next(&mut state, &request.session_topic, now)?;
                return Ok(request);
            }
            let Some(session) = self.registry.find(&request.session_topic)? else {
                warn!(request_id, "request outlived its session");
                self.release(&mut state, &request);
                self.finish_with_error(
                    &mut state,
                    &mut request,
                    RequestAction::Cancel,
                    ErrorReason::SessionNotFound,
                    now,
                )?;
                return Ok(request);
            };

            self.release(&mut state, &request);
            if !approve {
                self.finish_with_error(
                    &mut state,
                    &mut request,
                    RequestAction::Reject,
                    ErrorReason::UserRejected,
                    now,
                )?;
                self.promote_next(&mut state, &session.topic, now)?;
                return Ok(request);
            }

            self.apply_request(&mut state, &mut request, RequestAction::Approve, now)?;
            self.apply_request(&mut state, &mut request, RequestAction::StartSigning, now)?;
            state.requests.insert(key.clone(), request.clone());
            self.promote_next(&mut state, &session.topic, now)?;
            (request, session)
        };

        let mut signatures = Vec::with_capacity(request.items.len());
        for item in &request.items {
            if !item.sign {
                signatures.push(None);
                continue;
            }
            let cancelled = {
                let mut state = self.lock()?;
                self.take_if_cancelled(&mut state, &key)
            };
            if let Some(cancelled) = cancelled {
                return Ok(cancelled);
            }
            let signer = item.signer.as_deref().unwrap_or_default();
            match self.signer.sign(&item.payload, signer).await {
                Ok(signature) => signatures.push(Some(signature)),
                Err(e) => {
                    warn!(request_id, signer, error = %e, "signing failed");
                    return self.settle_failure(&key, RequestAction::SignFailure, e.reason());
                }
            }
        }

        {
            let now = self.now()?;
            let mut state = self.lock()?;
            if let Some(cancelled) = self.take_if_cancelled(&mut state, &key) {
                return Ok(cancelled);
            }
            self.apply_request(&mut state, &mut request, RequestAction::SignSuccess, now)?;
            self.apply_request(&mut state, &mut request, RequestAction::StartSubmitting, now)?;
            state.requests.insert(key.clone(), request.clone());
        }

        let mut transaction_id = None;
        if self.policy.submit_transactions && request.payload_kind.is_transaction() {
            let signed_group: Vec<u8> = signatures
                .iter()
                .flatten()
                .flat_map(|signed| signed.iter().copied())
                .collect();
            match self.submitter.submit(&signed_group).await {
                Ok(tx_id) => {
                    info!(request_id, tx_id = %tx_id, "transaction submitted");
                    transaction_id = Some(tx_id);
                }
                Err(e) => {
                    warn!(request_id, error = %e, "network submission failed");
                    return self.settle_failure(
                        &key,
                        RequestAction::SubmitFailure,
                        ErrorReason::SubmitFailed,
                    );
                }
            }
        }

        let now = self.now()?;
        let mut state = self.lock()?;
        if let Some(cancelled) = self.take_if_cancelled(&mut state, &key) {
            return Ok(cancelled);
        }
        request.transaction_id = transaction_id.clone();
        let response = SignedResponse {
            signatures,
            transaction_id,
        };
        let action = match self
            .walletconnect
            .respond_success(&request.target(), &response)
        {
            Ok(()) => RequestAction::SubmitSuccess,
            Err(e) => {
                warn!(request_id, topic = %session.topic, error = %e, "failed to emit signed response");
                request.failure = Some(ErrorReason::SubmitFailed);
                RequestAction::SubmitFailure
            }
        };
        self.apply_request(&mut state, &mut request, action, now)?;
        state.requests.remove(&key);
        self.finish_flow(&mut state, request.flow_id());
        self.publish(CoordinatorEvent::RequestFinished(request.clone()));
        Ok(request)
    }

    pub fn disconnect_session(&self, topic: &str) -> Result<(), CoordinatorError> {
        self.disconnect(topic, DisconnectOrigin::Wallet)
    }

    pub fn handle_peer_disconnect(&self, topic: &str) -> Result<(), CoordinatorError> {
        self.disconnect(topic, DisconnectOrigin::Peer)
    }

    /// Auto-rejects requests whose decision window elapsed and drops expired sessions.
    pub fn sweep_expired(&self) -> Result<SweepReport, CoordinatorError> {
        let now = self.now()?;
        let mut report = SweepReport::default();
        {
            let mut state = self.lock()?;
            let mut overdue: Vec<RequestKey> = state
                .requests
                .values()
                .filter(|r| {
                    r.state == RequestState::AwaitingUserDecision
                        && r.expires_at_ms.is_some_and(|at| now >= at)
                })
                .map(Request::key)
                .collect();
            overdue.sort_unstable();
            for key in overdue {
                let Some(mut request) = state.requests.get(&key).cloned() else {
                    continue;
                };
                self.release(&mut state, &request);
                self.finish_with_error(
                    &mut state,
                    &mut request,
                    RequestAction::Cancel,
                    ErrorReason::RequestExpired,
                    now,
                )?;
                self.promote_next(&mut state, &request.session_topic, now)?;
                report.expired_requests.push(key);
            }
        }

        let expired_sessions: Vec<String> = self
            .registry
            .all()?
            .into_iter()
            .filter(|s| s.expires_at_ms.is_some_and(|at| now >= at))
            .map(|s| s.topic)
            .collect();
        for topic in expired_sessions {
            self.disconnect(&topic, DisconnectOrigin::Expiry)?;
            report.expired_sessions.push(topic);
        }
        if !report.is_empty() {
            info!(
                requests = report.expired_requests.len(),
                sessions = report.expired_sessions.len(),
                "expired entries swept"
            );
        }
        Ok(report)
    }

    pub fn request(
        &self,
        topic: &str,
        request_id: u64,
    ) -> Result<Option<Request>, CoordinatorError> {
        Ok(self
            .lock()?
            .requests
            .get(&RequestKey::new(topic, request_id))
            .cloned())
    }

    pub fn proposal(&self, topic: &str) -> Result<Option<Session>, CoordinatorError> {
        Ok(self.lock()?.proposals.get(topic).cloned())
    }

    /// Pending requests of a session in presentation order.
    pub fn pending_requests(&self, topic: &str) -> Result<Vec<Request>, CoordinatorError> {
        let state = self.lock()?;
        Ok(state
            .queues
            .get(topic)
            .map(|queue| {
                queue
                    .iter()
                    .filter_map(|id| state.requests.get(&RequestKey::new(topic, *id)).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn transition_log(&self, flow_id: &str) -> Result<Vec<TransitionLogRecord>, CoordinatorError> {
        Ok(self.lock()?.logs.get(flow_id).cloned().unwrap_or_default())
    }

    fn disconnect(&self, topic: &str, origin: DisconnectOrigin) -> Result<(), CoordinatorError> {
        let now = self.now()?;
        let mut state = self.lock()?;

        if let Some(mut proposal) = state.proposals.remove(topic) {
            self.apply_session(&mut state, &mut proposal, SessionAction::Reject, now)?;
            self.finish_flow(&mut state, proposal.flow_id());
            if origin == DisconnectOrigin::Wallet {
                let error =
                    ErrorCodeMapper::map(proposal.protocol_version, ErrorReason::UserRejected);
                if let Err(e) = self.walletconnect.reject_session(&proposal, &error) {
                    warn!(topic, error = %e, "failed to emit session rejection");
                }
            }
            self.publish(CoordinatorEvent::SessionRejected(proposal));
            return Ok(());
        }

        let Some(mut session) = self.registry.remove(topic)? else {
            debug!(topic, "disconnect for unknown session ignored");
            return Ok(());
        };

        state.queues.remove(topic);
        let mut pending: Vec<RequestKey> = state
            .requests
            .values()
            .filter(|r| r.session_topic == topic && !r.state.is_terminal())
            .map(Request::key)
            .collect();
        pending.sort_unstable();
        for key in pending {
            let Some(mut request) = state.requests.get(&key).cloned() else {
                continue;
            };
            let in_flight = request.state.is_in_flight();
            self.finish_with_error(
                &mut state,
                &mut request,
                RequestAction::Cancel,
                ErrorReason::SessionNotFound,
                now,
            )?;
            if in_flight {
                // The owning decide_request call removes it once it resumes.
                state.requests.insert(key, request);
            }
        }

        self.apply_session(&mut state, &mut session, SessionAction::Disconnect, now)?;
        self.finish_flow(&mut state, session.flow_id());
        session.approved_account_address = None;
        if origin == DisconnectOrigin::Wallet {
            if let Err(e) = self.walletconnect.disconnect_session(&session) {
                warn!(topic, error = %e, "failed to emit session disconnect");
            }
        }
        info!(topic, origin = ?origin, "session disconnected");
        self.publish(CoordinatorEvent::SessionDisconnected(session));
        Ok(())
    }

    fn settle_failure(
        &self,
        key: &RequestKey,
        action: RequestAction,
        reason: ErrorReason,
    ) -> Result<Request, CoordinatorError> {
        let now = self.now()?;
        let mut state = self.lock()?;
        if let Some(cancelled) = self.take_if_cancelled(&mut state, key) {
            return Ok(cancelled);
        }
        let mut request = state
            .requests
            .get(key)
            .cloned()
            .ok_or_else(|| CoordinatorError::RequestNotFound(key.clone()))?;
        self.finish_with_error(&mut state, &mut request, action, reason, now)?;
        Ok(request)
    }

    /// Removes a request a disconnect cancelled while it was in flight.
    fn take_if_cancelled(&self, state: &mut CoordinatorState, key: &RequestKey) -> Option<Request> {
        match state.requests.get(key) {
            Some(r) if r.state == RequestState::Cancelled => {
                debug!(request = %key, "in-flight request was cancelled");
                state.requests.remove(key)
            }
            _ => None,
        }
    }

    /// Applies a terminal transition, emits the single error response and drops the request.
    fn finish_with_error(
        &self,
        state: &mut CoordinatorState,
        request: &mut Request,
        action: RequestAction,
        reason: ErrorReason,
        now: TimestampMs,
    ) -> Result<(), CoordinatorError> {
        request.failure = Some(reason);
        self.apply_request(state, request, action, now)?;
        self.emit_error(&request.target(), reason);
        state.requests.remove(&request.key());
        self.finish_flow(state, request.flow_id());
        self.publish(CoordinatorEvent::RequestFinished(request.clone()));
        Ok(())
    }

    /// Drops the request from its session queue.
    fn release(&self, state: &mut CoordinatorState, request: &Request) {
        if let Some(queue) = state.queues.get_mut(&request.session_topic) {
            queue.retain(|id| *id != request.request_id);
            if queue.is_empty() {
                state.queues.remove(&request.session_topic);
            }
        }
    }

    /// Surfaces the head of the session queue if nothing is awaiting a decision.
    fn promote_next(
        &self,
        state: &mut CoordinatorState,
        topic: &str,
        now: TimestampMs,
    ) -> Result<(), CoordinatorError> {
        let Some(head) = state.queues.get(topic).and_then(|q| q.front().copied()) else {
            return Ok(());
        };
        let key = RequestKey::new(topic, head);
        let Some(mut request) = state.requests.get(&key).cloned() else {
            return Ok(());
        };
        if request.state != RequestState::Valid {
            return Ok(());
        }
        self.apply_request(state, &mut request, RequestAction::Surface, now)?;
        request.expires_at_ms = Some(now.saturating_add_ms(self.policy.request_timeout_ms));
        state.requests.insert(key, request.clone());
        debug!(request_id = head, topic, "request awaiting user decision");
        self.publish(CoordinatorEvent::RequestAwaitingDecision(request));
        Ok(())
    }

    fn apply_request(
        &self,
        state: &mut CoordinatorState,
        request: &mut Request,
        action: RequestAction,
        now: TimestampMs,
    ) -> Result<(), CoordinatorError> {
        let (next, transition) = request_transition(request.state, action)?;
        request.state = next;
        self.record(
            state,
            request.flow_id(),
            format!("{:?}", transition.from),
            format!("{:?}", transition.to),
            Some(transition.reason.to_owned()),
            now,
        );
        Ok(())
    }

    fn apply_session(
        &self,
        state: &mut CoordinatorState,
        session: &mut Session,
        action: SessionAction,
        now: TimestampMs,
    ) -> Result<(), CoordinatorError> {
        let (next, transition) = session_transition(session.state, action)?;
        session.state = next;
        self.record(
            state,
            session.flow_id(),
            format!("{:?}", transition.from),
            format!("{:?}", transition.to),
            Some(transition.reason.to_owned()),
            now,
        );
        Ok(())
    }

    /// Drops a stale log left under a flow id that is being reused.
    fn start_flow(&self, state: &mut CoordinatorState, flow_id: &str) {
        if state.logs.remove(flow_id).is_some() {
            state.finished_flows.retain(|f| f != flow_id);
        }
    }

    /// Keeps at most `retained_flow_logs` logs of finished flows.
    fn finish_flow(&self, state: &mut CoordinatorState, flow_id: String) {
        state.finished_flows.push_back(flow_id);
        while state.finished_flows.len() > self.policy.retained_flow_logs {
            if let Some(evicted) = state.finished_flows.pop_front() {
                state.logs.remove(&evicted);
            }
        }
    }

    fn record(
        &self,
        state: &mut CoordinatorState,
        flow_id: String,
        state_before: impl Into<String>,
        state_after: impl Into<String>,
        reason: Option<String>,
        now: TimestampMs,
    ) {
        let log = state.logs.entry(flow_id.clone()).or_default();
        let event_seq = log.last().map(|x| x.event_seq + 1).unwrap_or(1);
        log.push(TransitionLogRecord {
            event_seq,
            flow_id,
            state_before: state_before.into(),
            state_after: state_after.into(),
            reason,
            recorded_at_ms: now,
        });
    }

    fn emit_error(&self, target: &ResponseTarget, reason: ErrorReason) {
        let error = ErrorCodeMapper::map(target.protocol_version, reason);
        match self.walletconnect.respond_error(target, &error) {
            Ok(()) => debug!(
                request_id = target.request_id,
                code = error.code(),
                reason = ?reason,
                "error response emitted"
            ),
            Err(e) => warn!(
                request_id = target.request_id,
                error = %e,
                "failed to emit error response"
            ),
        }
    }

    fn publish(&self, event: CoordinatorEvent) {
        if self.events.send(event).is_err() {
            debug!("coordinator event receiver dropped");
        }
    }

    fn now(&self) -> Result<TimestampMs, CoordinatorError> {
        Ok(TimestampMs(self.clock.now_ms()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, CoordinatorState>, CoordinatorError> {
        self.state.lock().map_err(|e| poisoned("coordinator", e))
    }
}
