use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CorrelationId;

/// Transport-side metadata that accompanies every inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    request_id: CorrelationId,
    source_timestamp: DateTime<Utc>,
    received_timestamp: DateTime<Utc>,
}

impl RequestHeader {
    pub fn new(
        request_id: CorrelationId,
        source_timestamp: DateTime<Utc>,
        received_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            source_timestamp,
            received_timestamp,
        }
    }

    pub fn request_id(&self) -> CorrelationId {
        self.request_id
    }

    /// When the client handed the request to the transport.
    pub fn source_timestamp(&self) -> DateTime<Utc> {
        self.source_timestamp
    }

    /// When the transport handed the request to the service side.
    pub fn received_timestamp(&self) -> DateTime<Utc> {
        self.received_timestamp
    }
}

/// 型消去されたリクエスト（service_type + エンコード済み payload）。
///
/// トランスポート境界でのみ生成・消費され、ユーザー API には出てきません。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRequest {
    service_type: String,
    payload: Vec<u8>,
}

impl RawRequest {
    pub fn new(service_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            service_type: service_type.into(),
            payload,
        }
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// 型消去されたレスポンス。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    service_type: String,
    payload: Vec<u8>,
}

impl RawResponse {
    pub fn new(service_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            service_type: service_type.into(),
            payload,
        }
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
