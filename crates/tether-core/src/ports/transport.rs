//! Transport port - 下位ミドルウェアとの境界
//!
//! コアがトランスポートに要求するのは次の 4 点だけです。
//! 1. サービス名で関心を登録し、登録トークンを受け取る
//! 2. `(CorrelationId, RawRequest)` を配送する
//! 3. 同じ CorrelationId を付けてレスポンスを送る
//! 4. 配送中のリクエストがあっても安全に登録解除できる
//!
//! ワイヤフォーマット・ディスカバリ・QoS の意味はトランスポート側の責務です。

use async_trait::async_trait;
use std::fmt;

use crate::domain::{
    CorrelationId, QosProfile, RawRequest, RawResponse, RequestHeader, ServiceName,
    TransportError, TransportSendError,
};

/// Registration token handed out by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportToken(u64);

impl TransportToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.0)
    }
}

/// One inbound request as handed over by the transport.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub token: TransportToken,
    pub service: ServiceName,
    pub header: RequestHeader,
    pub request: RawRequest,
}

/// Transport port (interface).
///
/// `next_delivery` is the only await point; everything on the reply path is
/// synchronous.
#[async_trait]
pub trait Transport: Send + Sync {
    /// False once the transport has been closed.
    fn is_available(&self) -> bool;

    fn register_service(
        &self,
        name: &ServiceName,
        service_type: &str,
        qos: &QosProfile,
    ) -> Result<TransportToken, TransportError>;

    /// Stop routing requests to `token`. Calling it twice is a no-op.
    fn deregister(&self, token: TransportToken);

    /// Wait for the next inbound request. `None` once the transport is closed.
    async fn next_delivery(&self) -> Option<Delivery>;

    fn send_response(
        &self,
        token: TransportToken,
        request_id: CorrelationId,
        response: RawResponse,
    ) -> Result<(), TransportSendError>;

    fn supports_error_responses(&self) -> bool {
        false
    }

    fn send_error(
        &self,
        _token: TransportToken,
        _request_id: CorrelationId,
        _reason: &str,
    ) -> Result<(), TransportSendError> {
        Err(TransportSendError::Unsupported)
    }

    /// The endpoint gave up on `request_id` and will never reply to it.
    /// Transports that keep per-request state release the caller here.
    fn abandon(&self, _token: TransportToken, _request_id: CorrelationId) {}
}
