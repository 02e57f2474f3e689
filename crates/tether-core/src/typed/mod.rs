//! Typed - 型付きサービス API
//!
//! このモジュールは service_type の取り違えを型で排除し、
//! Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `ServiceType` trait, `Handler<S>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod codec;
pub mod handler;
pub mod interfaces;
pub mod service;

pub use self::codec::{CodecError, PayloadCodec};
pub use self::handler::{DynHandler, Handler, RequestContext, TypedHandler, from_fn, from_simple_fn};
pub use self::service::ServiceType;
