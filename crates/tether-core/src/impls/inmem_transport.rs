//! InMemoryTransport - プロセス内で完結するトランスポート
//!
//! # 学習ポイント
//! - std Mutex（await を跨がない）+ tokio Notify による待機
//! - oneshot による 1 リクエスト 1 レスポンスの対応付け
//! - CorrelationId は (client, sequence_number) でトランスポートが発行
//!
//! 実ミドルウェアの代わりに、テストとデモで使います。

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, oneshot};
use tracing::{debug, trace};

use crate::domain::{
    CallError, ClientGid, CorrelationId, InvalidServiceName, QosProfile, RawRequest, RawResponse,
    RequestHeader, ServiceName, TransportError, TransportSendError,
};
use crate::ports::{
    Clock, Delivery, IdGenerator, SystemClock, Transport, TransportToken, UlidGenerator,
};
use crate::typed::{PayloadCodec, ServiceType};

/// How many replies `sent()` remembers; older records are discarded first.
pub const SENT_LOG_CAPACITY: usize = 256;

#[derive(Debug)]
enum Reply {
    Response(RawResponse),
    Error(String),
}

/// What the transport sent back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentKind {
    Response,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub token: TransportToken,
    pub request_id: CorrelationId,
    pub kind: SentKind,
}

impl SentRecord {
    pub fn is_error(&self) -> bool {
        matches!(self.kind, SentKind::Error(_))
    }
}

#[derive(Debug, Clone)]
struct ServiceSlot {
    token: TransportToken,
    service_type: String,
    qos: QosProfile,
}

struct QueuedRequest {
    token: TransportToken,
    service: ServiceName,
    request_id: CorrelationId,
    source_timestamp: DateTime<Utc>,
    request: RawRequest,
}

struct PendingCall {
    token: TransportToken,
    reply: oneshot::Sender<Reply>,
}

struct State {
    closed: bool,
    next_token: u64,
    services: HashMap<ServiceName, ServiceSlot>,
    queue: VecDeque<QueuedRequest>,
    pending: HashMap<CorrelationId, PendingCall>,
    sent: VecDeque<SentRecord>,
}

impl State {
    fn new() -> Self {
        Self {
            closed: false,
            next_token: 1,
            services: HashMap::new(),
            queue: VecDeque::new(),
            pending: HashMap::new(),
            sent: VecDeque::with_capacity(SENT_LOG_CAPACITY),
        }
    }

    fn is_token_live(&self, token: TransportToken) -> bool {
        self.services.values().any(|slot| slot.token == token)
    }
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

/// In-process transport. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct InMemoryTransport {
    shared: Arc<Shared>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock<C: Clock + Clone + 'static>(clock: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::new()),
                notify: Notify::new(),
                clock: Box::new(clock.clone()),
                ids: Box::new(UlidGenerator::new(clock)),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Client for service `S` on `service`. Each client gets its own id.
    pub fn client<S: ServiceType>(
        &self,
        service: &str,
    ) -> Result<ServiceClient<S>, InvalidServiceName> {
        Ok(ServiceClient {
            transport: self.clone(),
            service: ServiceName::new(service)?,
            gid: self.shared.ids.generate_client_gid(),
            next_sequence: AtomicI64::new(1),
            _marker: PhantomData,
        })
    }

    /// Queue a request with a caller-chosen id.
    pub fn deliver(
        &self,
        service: &ServiceName,
        request_id: CorrelationId,
        request: RawRequest,
    ) -> Result<PendingReply, CallError> {
        let (tx, rx) = oneshot::channel();
        let source_timestamp = self.shared.clock.now();
        {
            let mut state = self.lock();
            if state.closed {
                return Err(CallError::Closed);
            }
            let token = match state.services.get(service) {
                Some(slot) => slot.token,
                None => return Err(CallError::ServiceUnavailable(service.clone())),
            };
            if state.pending.contains_key(&request_id) {
                return Err(CallError::DuplicateRequest(request_id));
            }
            state.pending.insert(request_id, PendingCall { token, reply: tx });
            state.queue.push_back(QueuedRequest {
                token,
                service: service.clone(),
                request_id,
                source_timestamp,
                request,
            });
        }
        trace!(service = %service, request_id = %request_id, "request queued");
        self.shared.notify.notify_one();
        Ok(PendingReply { request_id, rx })
    }

    /// Register a pending reply for `request_id` without queueing a delivery.
    ///
    /// For driving an endpoint by hand.
    pub fn expect_reply(
        &self,
        token: TransportToken,
        request_id: CorrelationId,
    ) -> Result<PendingReply, CallError> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        if state.closed {
            return Err(CallError::Closed);
        }
        if state.pending.contains_key(&request_id) {
            return Err(CallError::DuplicateRequest(request_id));
        }
        state.pending.insert(request_id, PendingCall { token, reply: tx });
        Ok(PendingReply { request_id, rx })
    }

    /// Close the transport: pending calls are cancelled and `next_delivery`
    /// returns `None`.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.queue.clear();
            state.pending.clear();
        }
        self.shared.notify.notify_waiters();
        debug!("in-memory transport closed");
    }

    pub fn is_registered(&self, service: &str) -> bool {
        ServiceName::new(service)
            .map(|name| self.lock().services.contains_key(&name))
            .unwrap_or(false)
    }

    pub fn qos_of(&self, service: &str) -> Option<QosProfile> {
        let name = ServiceName::new(service).ok()?;
        self.lock().services.get(&name).map(|slot| slot.qos)
    }

    pub fn service_type_of(&self, service: &str) -> Option<String> {
        let name = ServiceName::new(service).ok()?;
        self.lock()
            .services
            .get(&name)
            .map(|slot| slot.service_type.clone())
    }

    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn pending_calls(&self) -> usize {
        self.lock().pending.len()
    }

    /// The latest replies sent back, oldest first. At most
    /// [`SENT_LOG_CAPACITY`] records are kept.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.lock().sent.iter().cloned().collect()
    }

    fn complete(
        &self,
        token: TransportToken,
        request_id: CorrelationId,
        reply: Reply,
    ) -> Result<(), TransportSendError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportSendError::Closed);
        }
        if !state.is_token_live(token) {
            return Err(TransportSendError::NotRegistered);
        }
        let Some(call) = state.pending.remove(&request_id) else {
            return Err(TransportSendError::UnknownRequest(request_id));
        };
        if call.token != token {
            state.pending.insert(request_id, call);
            return Err(TransportSendError::UnknownRequest(request_id));
        }
        let kind = match &reply {
            Reply::Response(_) => SentKind::Response,
            Reply::Error(reason) => SentKind::Error(reason.clone()),
        };
        if state.sent.len() == SENT_LOG_CAPACITY {
            state.sent.pop_front();
        }
        state.sent.push_back(SentRecord {
            token,
            request_id,
            kind,
        });
        // the caller may have given up waiting
        let _ = call.reply.send(reply);
        Ok(())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn is_available(&self) -> bool {
        !self.lock().closed
    }

    fn register_service(
        &self,
        name: &ServiceName,
        service_type: &str,
        qos: &QosProfile,
    ) -> Result<TransportToken, TransportError> {
        qos.validate()
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Unavailable);
        }
        if state.services.contains_key(name) {
            return Err(TransportError::NameInUse(name.clone()));
        }
        let token = TransportToken::new(state.next_token);
        state.next_token += 1;
        state.services.insert(
            name.clone(),
            ServiceSlot {
                token,
                service_type: service_type.to_string(),
                qos: *qos,
            },
        );
        debug!(service = %name, service_type, token = %token, "service registered on transport");
        Ok(token)
    }

    fn deregister(&self, token: TransportToken) {
        let mut state = self.lock();
        state.services.retain(|_, slot| slot.token != token);
        state.queue.retain(|queued| queued.token != token);
        // dropping the senders cancels the callers
        state.pending.retain(|_, call| call.token != token);
    }

    async fn next_delivery(&self) -> Option<Delivery> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(queued) = state.queue.pop_front() {
                    let header = RequestHeader::new(
                        queued.request_id,
                        queued.source_timestamp,
                        self.shared.clock.now(),
                    );
                    return Some(Delivery {
                        token: queued.token,
                        service: queued.service,
                        header,
                        request: queued.request,
                    });
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    fn send_response(
        &self,
        token: TransportToken,
        request_id: CorrelationId,
        response: RawResponse,
    ) -> Result<(), TransportSendError> {
        self.complete(token, request_id, Reply::Response(response))
    }

    fn supports_error_responses(&self) -> bool {
        true
    }

    fn send_error(
        &self,
        token: TransportToken,
        request_id: CorrelationId,
        reason: &str,
    ) -> Result<(), TransportSendError> {
        self.complete(token, request_id, Reply::Error(reason.to_string()))
    }

    fn abandon(&self, token: TransportToken, request_id: CorrelationId) {
        let mut state = self.lock();
        let owned = state
            .pending
            .get(&request_id)
            .is_some_and(|call| call.token == token);
        if owned {
            // dropping the sender cancels the caller
            state.pending.remove(&request_id);
            trace!(request_id = %request_id, token = %token, "pending call abandoned");
        }
    }
}

/// Waits for the reply to one request.
#[derive(Debug)]
pub struct PendingReply {
    request_id: CorrelationId,
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    pub fn request_id(&self) -> CorrelationId {
        self.request_id
    }

    pub async fn wait(self) -> Result<RawResponse, CallError> {
        match self.rx.await {
            Ok(Reply::Response(raw)) => Ok(raw),
            Ok(Reply::Error(reason)) => Err(CallError::Remote(reason)),
            Err(_) => Err(CallError::Cancelled),
        }
    }
}

/// Typed client for one service on an [`InMemoryTransport`].
pub struct ServiceClient<S: ServiceType> {
    transport: InMemoryTransport,
    service: ServiceName,
    gid: ClientGid,
    next_sequence: AtomicI64,
    _marker: PhantomData<fn() -> S>,
}

impl<S: ServiceType> ServiceClient<S> {
    pub fn gid(&self) -> ClientGid {
        self.gid
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn is_service_ready(&self) -> bool {
        self.transport.lock().services.contains_key(&self.service)
    }

    /// Queue a request; the returned handle resolves once the service replies.
    pub fn send_request(&self, request: &S::Request) -> Result<PendingReply, CallError> {
        let raw = PayloadCodec::encode_request(S::TYPE, request)?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let request_id = CorrelationId::new(self.gid, sequence);
        self.transport.deliver(&self.service, request_id, raw)
    }

    pub async fn call(&self, request: &S::Request) -> Result<S::Response, CallError> {
        let raw = self.send_request(request)?.wait().await?;
        Ok(PayloadCodec::decode_response(S::TYPE, &raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use crate::typed::interfaces::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse};
    use chrono::TimeZone;
    use std::time::Duration;

    fn register(transport: &InMemoryTransport, name: &str) -> TransportToken {
        transport
            .register_service(
                &ServiceName::new(name).unwrap(),
                AddTwoInts::TYPE,
                &QosProfile::default(),
            )
            .unwrap()
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let transport = InMemoryTransport::new();
        register(&transport, "add_two_ints");
        let err = transport
            .register_service(
                &ServiceName::new("add_two_ints").unwrap(),
                AddTwoInts::TYPE,
                &QosProfile::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::NameInUse(_)));
    }

    #[test]
    fn invalid_qos_is_rejected() {
        let transport = InMemoryTransport::new();
        let err = transport
            .register_service(
                &ServiceName::new("add_two_ints").unwrap(),
                AddTwoInts::TYPE,
                &QosProfile::reliable().keep_last(0),
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }

    #[test]
    fn closed_transport_refuses_registration() {
        let transport = InMemoryTransport::new();
        transport.close();
        assert!(!transport.is_available());
        let err = transport
            .register_service(
                &ServiceName::new("add_two_ints").unwrap(),
                AddTwoInts::TYPE,
                &QosProfile::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable));
    }

    #[tokio::test]
    async fn client_ids_are_sequential_per_client() {
        let transport = InMemoryTransport::new();
        register(&transport, "add_two_ints");
        let client = transport.client::<AddTwoInts>("add_two_ints").unwrap();

        let first = client.send_request(&AddTwoIntsRequest { a: 1, b: 2 }).unwrap();
        let second = client.send_request(&AddTwoIntsRequest { a: 3, b: 4 }).unwrap();

        assert_eq!(first.request_id().client(), client.gid());
        assert_eq!(first.request_id().sequence_number(), 1);
        assert_eq!(second.request_id().sequence_number(), 2);
        assert_eq!(transport.queued(), 2);
    }

    #[tokio::test]
    async fn delivery_is_stamped_by_the_clock() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let transport = InMemoryTransport::with_clock(FixedClock::new(at));
        let token = register(&transport, "add_two_ints");
        let client = transport.client::<AddTwoInts>("add_two_ints").unwrap();
        let pending = client.send_request(&AddTwoIntsRequest { a: 1, b: 2 }).unwrap();

        let delivery = transport.next_delivery().await.unwrap();
        assert_eq!(delivery.token, token);
        assert_eq!(delivery.header.request_id(), pending.request_id());
        assert_eq!(delivery.header.source_timestamp(), at);
        assert_eq!(delivery.header.received_timestamp(), at);
    }

    #[tokio::test]
    async fn response_reaches_the_waiting_client() {
        let transport = InMemoryTransport::new();
        let token = register(&transport, "add_two_ints");
        let client = transport.client::<AddTwoInts>("add_two_ints").unwrap();

        let call = tokio::spawn(async move { client.call(&AddTwoIntsRequest { a: 2, b: 5 }).await });

        let delivery = transport.next_delivery().await.unwrap();
        let raw = PayloadCodec::encode_response(AddTwoInts::TYPE, &AddTwoIntsResponse { sum: 7 })
            .unwrap();
        transport
            .send_response(token, delivery.header.request_id(), raw)
            .unwrap();

        let response = call.await.unwrap().unwrap();
        assert_eq!(response.sum, 7);
    }

    #[tokio::test]
    async fn second_reply_for_the_same_id_is_refused() {
        let transport = InMemoryTransport::new();
        let token = register(&transport, "add_two_ints");
        let client = transport.client::<AddTwoInts>("add_two_ints").unwrap();
        let _pending = client.send_request(&AddTwoIntsRequest { a: 1, b: 1 }).unwrap();
        let delivery = transport.next_delivery().await.unwrap();
        let id = delivery.header.request_id();

        let raw = PayloadCodec::encode_response(AddTwoInts::TYPE, &AddTwoIntsResponse { sum: 2 })
            .unwrap();
        transport.send_response(token, id, raw.clone()).unwrap();
        let err = transport.send_response(token, id, raw).unwrap_err();
        assert_eq!(err, TransportSendError::UnknownRequest(id));
    }

    #[tokio::test]
    async fn deregister_cancels_queued_calls() {
        let transport = InMemoryTransport::new();
        let token = register(&transport, "add_two_ints");
        let client = transport.client::<AddTwoInts>("add_two_ints").unwrap();
        let pending = client.send_request(&AddTwoIntsRequest { a: 1, b: 1 }).unwrap();

        transport.deregister(token);
        transport.deregister(token);

        assert_eq!(transport.queued(), 0);
        assert!(matches!(pending.wait().await, Err(CallError::Cancelled)));
        assert!(matches!(
            client.send_request(&AddTwoIntsRequest { a: 1, b: 1 }),
            Err(CallError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn abandon_cancels_only_the_owning_call() {
        let transport = InMemoryTransport::new();
        let token = register(&transport, "add_two_ints");
        let other = register(&transport, "other");
        let client = transport.client::<AddTwoInts>("add_two_ints").unwrap();
        let pending = client.send_request(&AddTwoIntsRequest { a: 1, b: 1 }).unwrap();
        let id = pending.request_id();

        transport.abandon(other, id);
        assert_eq!(transport.pending_calls(), 1);

        transport.abandon(token, id);
        assert_eq!(transport.pending_calls(), 0);
        assert!(matches!(pending.wait().await, Err(CallError::Cancelled)));
    }

    #[test]
    fn sent_log_keeps_only_the_latest_replies() {
        let transport = InMemoryTransport::new();
        let token = register(&transport, "add_two_ints");
        let gid = transport.shared.ids.generate_client_gid();
        let raw = PayloadCodec::encode_response(AddTwoInts::TYPE, &AddTwoIntsResponse { sum: 0 })
            .unwrap();

        let total = SENT_LOG_CAPACITY as i64 + 10;
        for seq in 1..=total {
            let id = CorrelationId::new(gid, seq);
            let _pending = transport.expect_reply(token, id).unwrap();
            transport.send_response(token, id, raw.clone()).unwrap();
        }

        let sent = transport.sent();
        assert_eq!(sent.len(), SENT_LOG_CAPACITY);
        assert_eq!(sent[0].request_id.sequence_number(), 11);
        assert_eq!(sent[SENT_LOG_CAPACITY - 1].request_id.sequence_number(), total);
    }

    #[tokio::test]
    async fn close_wakes_a_waiting_receiver() {
        let transport = InMemoryTransport::new();
        let waiter = tokio::spawn({
            let transport = transport.clone();
            async move { transport.next_delivery().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.close();

        let delivered = waiter.await.unwrap();
        assert!(delivered.is_none());
    }
}
