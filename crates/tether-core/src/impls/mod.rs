//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTransport**: プロセス内トランスポート + 型付きクライアント
//!
//! 実ミドルウェア向けの実装は別クレートに置く想定です。

pub mod inmem_transport;

pub use self::inmem_transport::{
    InMemoryTransport, PendingReply, SENT_LOG_CAPACITY, SentKind, SentRecord, ServiceClient,
};
