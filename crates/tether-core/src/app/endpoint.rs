//! ServiceEndpoint - 1 サービス分のリクエスト→レスポンス処理
//!
//! # 状態遷移
//! `Unregistered -> Registered -> Deregistered`
//!
//! - Unregistered: 生成直後。サービステーブルに公開される前
//! - Registered: リクエストを受け付ける
//! - Deregistered: 終端。新しい dispatch は受け付けない
//!
//! # 保証
//! 受け付けた CorrelationId ごとに、レスポンス（またはエラーレスポンス）の送信が
//! ちょうど 1 回、もしくは drop の記録がちょうど 1 回行われます。
//!
//! 一度受け付けた id は二度と dispatch しません。クライアントごとの sequence_number は
//! 単調増加なので、クライアントごとの最大値（high-water mark）だけを覚えておけば足ります。
//!
//! # 並行性
//! dispatch 中は state の read lock を保持し、`deregister` は write lock を取ります。
//! そのため teardown は実行中の dispatch の完了を待ちます。
//! 同じエンドポイントへの並行 dispatch はここでは直列化しません。

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use super::options::HandlerErrorPolicy;
use super::status::{EndpointCounts, EndpointStats};
use crate::domain::{
    ClientGid, CorrelationId, DispatchError, EndpointError, RawRequest, RawResponse, RequestHeader,
    ServiceName,
};
use crate::ports::{Transport, TransportToken};
use crate::typed::{DynHandler, RequestContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Unregistered,
    Registered,
    Deregistered,
}

/// How one accepted request was settled.
#[derive(Debug)]
pub enum Disposition {
    Responded,
    /// The handler failed and an error response went out with the same id.
    ErrorResponse(DispatchError),
    /// The handler failed and the id was abandoned (logged and counted).
    Dropped(DispatchError),
    /// `send_response` answered the id while the handler ran; the handler's
    /// result was discarded (logged and counted).
    AlreadyAnswered,
}

#[derive(Debug, Default)]
struct Admission {
    in_flight: HashSet<CorrelationId>,
    /// Highest sequence number admitted per client.
    high_water: HashMap<ClientGid, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admit {
    Accepted,
    InFlight,
    /// At or below the client's high-water mark: answered (or abandoned) before.
    Seen,
}

pub struct ServiceEndpoint {
    node_name: String,
    name: ServiceName,
    handler: Box<dyn DynHandler>,
    transport: Arc<dyn Transport>,
    token: TransportToken,
    policy: HandlerErrorPolicy,
    state: RwLock<EndpointState>,
    admission: Mutex<Admission>,
    stats: EndpointStats,
}

impl ServiceEndpoint {
    /// `token` must come from `transport.register_service` for `name`.
    pub fn new(
        node_name: impl Into<String>,
        name: ServiceName,
        handler: Box<dyn DynHandler>,
        transport: Arc<dyn Transport>,
        token: TransportToken,
        policy: HandlerErrorPolicy,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            name,
            handler,
            transport,
            token,
            policy,
            state: RwLock::new(EndpointState::Unregistered),
            admission: Mutex::new(Admission::default()),
            stats: EndpointStats::default(),
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn service_type(&self) -> &'static str {
        self.handler.service_type()
    }

    pub fn token(&self) -> TransportToken {
        self.token
    }

    pub fn policy(&self) -> HandlerErrorPolicy {
        self.policy
    }

    pub fn state(&self) -> EndpointState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> EndpointCounts {
        self.stats.snapshot()
    }

    /// Unregistered -> Registered. No effect in any other state.
    pub(crate) fn mark_registered(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == EndpointState::Unregistered {
            *state = EndpointState::Registered;
        }
    }

    /// Handle one inbound request.
    ///
    /// Blocks for the full handler duration. Handler errors and panics are
    /// settled by the configured policy and returned as a [`Disposition`];
    /// `Err` means the request was refused before dispatch or the reply could
    /// not be sent.
    pub fn handle_request(
        &self,
        header: &RequestHeader,
        request: &RawRequest,
    ) -> Result<Disposition, EndpointError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match *state {
            EndpointState::Registered => {}
            EndpointState::Unregistered => {
                self.stats.record_rejected();
                return Err(EndpointError::NotServing(self.name.clone()));
            }
            EndpointState::Deregistered => {
                self.stats.record_rejected();
                return Err(EndpointError::Deregistered(self.name.clone()));
            }
        }

        let request_id = header.request_id();
        let admit = self.admit(request_id);
        if admit != Admit::Accepted {
            self.stats.record_rejected();
            if admit == Admit::Seen {
                // nobody will answer this delivery
                self.transport.abandon(self.token, request_id);
            }
            warn!(
                node = %self.node_name,
                service = %self.name,
                request_id = %request_id,
                in_flight = admit == Admit::InFlight,
                "duplicate request id refused"
            );
            return Err(EndpointError::DuplicateRequest(request_id));
        }
        self.stats.record_handled();

        let ctx = RequestContext::new(&self.node_name, &self.name, header);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.handler.dispatch(&ctx, request)))
            .unwrap_or_else(|payload| Err(DispatchError::Panicked(panic_message(payload))));

        let outcome = match result {
            Ok(response) => match self.forward(request_id, response) {
                Ok(()) => Ok(Disposition::Responded),
                Err(EndpointError::UnknownRequest(_)) => Ok(self.discard(request_id)),
                Err(err) => Err(err),
            },
            Err(err) => self.settle_failure(request_id, err),
        };
        drop(state);
        outcome
    }

    /// Forward a response for a request currently in flight on this endpoint.
    ///
    /// Fails with `Deregistered` after teardown and with `UnknownRequest` if
    /// the id was never admitted or has already been answered.
    pub fn send_response(
        &self,
        request_id: CorrelationId,
        response: RawResponse,
    ) -> Result<(), EndpointError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if *state != EndpointState::Registered {
            return Err(EndpointError::Deregistered(self.name.clone()));
        }
        let result = self.forward(request_id, response);
        drop(state);
        result
    }

    /// Stop serving: waits for in-flight dispatches, then releases the
    /// transport registration. Idempotent.
    ///
    /// Must not be called from inside this endpoint's own handler.
    pub fn deregister(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == EndpointState::Deregistered {
            return;
        }
        *state = EndpointState::Deregistered;
        self.transport.deregister(self.token);
        debug!(node = %self.node_name, service = %self.name, token = %self.token, "service deregistered");
    }

    fn admit(&self, request_id: CorrelationId) -> Admit {
        let mut admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        if admission.in_flight.contains(&request_id) {
            return Admit::InFlight;
        }
        let sequence = request_id.sequence_number();
        let seen = admission
            .high_water
            .get(&request_id.client())
            .is_some_and(|&high| sequence <= high);
        if seen {
            return Admit::Seen;
        }
        admission.high_water.insert(request_id.client(), sequence);
        admission.in_flight.insert(request_id);
        Admit::Accepted
    }

    fn take(&self, request_id: CorrelationId) -> bool {
        self.admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .remove(&request_id)
    }

    fn discard(&self, request_id: CorrelationId) -> Disposition {
        self.stats.record_discarded();
        warn!(
            node = %self.node_name,
            service = %self.name,
            request_id = %request_id,
            "request already answered; handler result discarded"
        );
        Disposition::AlreadyAnswered
    }

    /// Caller holds the state read guard.
    fn forward(&self, request_id: CorrelationId, response: RawResponse) -> Result<(), EndpointError> {
        if !self.take(request_id) {
            return Err(EndpointError::UnknownRequest(request_id));
        }
        match self.transport.send_response(self.token, request_id, response) {
            Ok(()) => {
                self.stats.record_responded();
                debug!(node = %self.node_name, service = %self.name, request_id = %request_id, "response sent");
                Ok(())
            }
            Err(err) => {
                self.stats.record_send_failure();
                warn!(
                    node = %self.node_name,
                    service = %self.name,
                    request_id = %request_id,
                    error = %err,
                    "failed to send response"
                );
                Err(err.into())
            }
        }
    }

    /// Caller holds the state read guard.
    fn settle_failure(
        &self,
        request_id: CorrelationId,
        err: DispatchError,
    ) -> Result<Disposition, EndpointError> {
        warn!(
            node = %self.node_name,
            service = %self.name,
            request_id = %request_id,
            error = %err,
            "service handler failed"
        );
        if !self.take(request_id) {
            return Ok(self.discard(request_id));
        }

        if self.policy == HandlerErrorPolicy::SendError && self.transport.supports_error_responses()
        {
            return match self.transport.send_error(self.token, request_id, &err.to_string()) {
                Ok(()) => {
                    self.stats.record_error_response();
                    Ok(Disposition::ErrorResponse(err))
                }
                Err(send_err) => {
                    self.stats.record_send_failure();
                    warn!(
                        node = %self.node_name,
                        service = %self.name,
                        request_id = %request_id,
                        error = %send_err,
                        "failed to send error response"
                    );
                    Err(send_err.into())
                }
            };
        }

        self.stats.record_dropped();
        self.transport.abandon(self.token, request_id);
        warn!(
            node = %self.node_name,
            service = %self.name,
            request_id = %request_id,
            "request abandoned after handler failure"
        );
        Ok(Disposition::Dropped(err))
    }
}

impl Drop for ServiceEndpoint {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl std::fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("node_name", &self.node_name)
            .field("name", &self.name)
            .field("service_type", &self.service_type())
            .field("token", &self.token)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
