//! PayloadCodec - RawRequest/RawResponse と型付きメッセージの相互変換
//!
//! # フロー
//! 1. service_type を検証（型消去の境界で唯一の型チェック）
//! 2. serde_json で bytes <-> T
//!
//! 不正な bytes を任意の型として読むことはしません。

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::domain::{RawRequest, RawResponse};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json decode: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("json encode: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("expected payload of type '{expected}', got '{actual}'")]
    WrongType { expected: String, actual: String },
}

/// JSON payload codec used on both sides of the transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec;

impl PayloadCodec {
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Encode)
    }

    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }

    pub fn encode_request<T: Serialize>(
        service_type: &str,
        request: &T,
    ) -> Result<RawRequest, CodecError> {
        Ok(RawRequest::new(service_type, Self::encode(request)?))
    }

    pub fn encode_response<T: Serialize>(
        service_type: &str,
        response: &T,
    ) -> Result<RawResponse, CodecError> {
        Ok(RawResponse::new(service_type, Self::encode(response)?))
    }

    pub fn decode_response<T: DeserializeOwned>(
        service_type: &str,
        raw: &RawResponse,
    ) -> Result<T, CodecError> {
        if raw.service_type() != service_type {
            return Err(CodecError::WrongType {
                expected: service_type.to_string(),
                actual: raw.service_type().to_string(),
            });
        }
        Self::decode(raw.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::ServiceType;
    use crate::typed::interfaces::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse};

    #[test]
    fn request_is_tagged_with_service_type() {
        let raw = PayloadCodec::encode_request(AddTwoInts::TYPE, &AddTwoIntsRequest { a: 1, b: 2 })
            .unwrap();
        assert_eq!(raw.service_type(), AddTwoInts::TYPE);

        let back: AddTwoIntsRequest = PayloadCodec::decode(raw.payload()).unwrap();
        assert_eq!(back, AddTwoIntsRequest { a: 1, b: 2 });
    }

    #[test]
    fn response_with_wrong_type_is_rejected() {
        let raw = RawResponse::new("std_srvs/srv/Trigger", b"{}".to_vec());
        let err = PayloadCodec::decode_response::<AddTwoIntsResponse>(AddTwoInts::TYPE, &raw)
            .unwrap_err();
        assert!(matches!(err, CodecError::WrongType { .. }));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = PayloadCodec::decode::<AddTwoIntsRequest>(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
