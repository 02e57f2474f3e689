//! tether-core
//!
//! Typed request/response services on top of an untyped transport.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, service_name, message, qos, errors）
//! - **typed**: 型付きサービス API（ServiceType, Handler, DynHandler, PayloadCodec）
//! - **ports**: 抽象化レイヤー（Transport, Clock, IdGenerator）
//! - **app**: Context, Node（create_service）, ServiceEndpoint, Executor
//! - **impls**: 実装（InMemoryTransport など開発用）
//!
//! # 流れ
//! transport → `ServiceEndpoint::handle_request` → `DynHandler::dispatch`
//! → user handler → `Transport::send_response`（同じ CorrelationId）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{Context, Executor, Node, ServiceHandle, ServiceOptions};
pub use typed::{Handler, RequestContext, ServiceType};
