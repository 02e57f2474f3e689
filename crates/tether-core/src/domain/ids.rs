//! Identifiers used on the transport boundary.
//!
//! # ULID ベースのクライアント ID
//! クライアント（呼び出し側）は ULID で識別します。
//! `Id<T>` は Phantom type パターンで、`ClientGid` と将来追加される ID 型を
//! コンパイル時に区別します。
//!
//! # CorrelationId
//! トランスポートがリクエストごとに発行するトークン。
//! `(client, sequence_number)` の組で、レスポンスにそのまま載せて返します。
//! エンドポイント側では生成・再利用・破棄してはいけません。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックスを提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しません。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Client のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Client {}

impl IdMarker for Client {
    fn prefix() -> &'static str {
        "client-"
    }
}

/// Identifier of a calling client (the writer side of a request).
pub type ClientGid = Id<Client>;

/// Per-request token issued by the transport and echoed on the reply.
///
/// The sequence number is monotonically increasing per client, so the pair
/// is unique for the lifetime of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId {
    client: ClientGid,
    sequence_number: i64,
}

impl CorrelationId {
    pub fn new(client: ClientGid, sequence_number: i64) -> Self {
        Self {
            client,
            sequence_number,
        }
    }

    pub fn client(&self) -> ClientGid {
        self.client
    }

    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.client, self.sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_gid_display_has_prefix() {
        let gid = ClientGid::from_ulid(Ulid::new());
        assert!(gid.to_string().starts_with("client-"));
    }

    #[test]
    fn correlation_ids_differ_by_sequence() {
        let gid = ClientGid::from_ulid(Ulid::new());
        let a = CorrelationId::new(gid, 1);
        let b = CorrelationId::new(gid, 2);

        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a.client(), b.client());
    }

    #[test]
    fn correlation_ids_differ_by_client() {
        let a = CorrelationId::new(ClientGid::from_ulid(Ulid::new()), 7);
        let b = CorrelationId::new(ClientGid::from_ulid(Ulid::new()), 7);
        assert_ne!(a, b);
    }

    #[test]
    fn correlation_id_survives_json() {
        let id = CorrelationId::new(ClientGid::from_ulid(Ulid::new()), 42);
        let s = serde_json::to_string(&id).unwrap();
        let back: CorrelationId = serde_json::from_str(&s).unwrap();
        assert_eq!(id, back);
        assert_eq!(back.sequence_number(), 42);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<ClientGid>(), size_of::<Ulid>());
    }
}
