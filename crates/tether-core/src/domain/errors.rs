//! Errors - エラー型と分類
//!
//! # 分類
//! - **RegistrationError**: create_service 時のエラー（部分的な登録は残らない）
//! - **DispatchError**: handler 実行まわりのエラー（型不一致・デコード・handler 失敗・panic）
//! - **TransportSendError**: レスポンス送信の失敗（リトライしない）
//! - **EndpointError**: エンドポイントの状態に起因するエラー（teardown 後の送信など）
//! - **CallError**: クライアント側の呼び出しエラー

use thiserror::Error;

use super::qos::InvalidQos;
use super::service_name::InvalidServiceName;
use super::{CorrelationId, ServiceName};
use crate::typed::codec::CodecError;

/// Error returned by a user handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("node name must not be empty")]
    EmptyName,
}

/// Errors raised by a transport while accepting a registration.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not available")]
    Unavailable,

    #[error("service '{0}' is already registered on the transport")]
    NameInUse(ServiceName),

    #[error("transport rejected the configuration: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    InvalidName(#[from] InvalidServiceName),

    #[error("service '{0}' is already registered on this node")]
    Duplicate(ServiceName),

    #[error("node '{node}' cannot register services: {reason}")]
    NotReady { node: String, reason: &'static str },

    #[error("invalid qos: {0}")]
    InvalidQos(#[from] InvalidQos),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request of type '{actual}' delivered to a '{expected}' service")]
    TypeMismatch { expected: String, actual: String },

    #[error("request decode: {0}")]
    Decode(#[source] CodecError),

    #[error("response encode: {0}")]
    Encode(#[source] CodecError),

    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportSendError {
    #[error("transport is closed")]
    Closed,

    #[error("service is not registered on the transport")]
    NotRegistered,

    #[error("no pending request with id {0}")]
    UnknownRequest(CorrelationId),

    #[error("transport does not support error responses")]
    Unsupported,
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("service '{0}' is not serving requests")]
    NotServing(ServiceName),

    #[error("service '{0}' was deregistered")]
    Deregistered(ServiceName),

    #[error("request {0} is already in flight")]
    DuplicateRequest(CorrelationId),

    #[error("request {0} is not in flight on this endpoint")]
    UnknownRequest(CorrelationId),

    #[error(transparent)]
    Send(#[from] TransportSendError),
}

/// Client-side errors of a service call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("service '{0}' is not available")]
    ServiceUnavailable(ServiceName),

    #[error("service returned an error: {0}")]
    Remote(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("request {0} is already pending on the transport")]
    DuplicateRequest(CorrelationId),

    #[error("call was cancelled before a response arrived")]
    Cancelled,

    #[error("transport is closed")]
    Closed,
}
