//! Handler trait - サービスリクエストを処理する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<S>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<S, H> → DynHandler)
//!
//! 型消去の境界で行う変換は `service_type` の照合と serde によるデコードのみで、
//! 任意のメモリを別の型として読むことはありません。

use std::marker::PhantomData;

use super::codec::PayloadCodec;
use super::service::ServiceType;
use crate::domain::{
    CorrelationId, DispatchError, HandlerError, RawRequest, RawResponse, RequestHeader,
    ServiceName,
};

/// Handler に渡される実行コンテキスト
///
/// ノード名やリクエストヘッダはグローバル変数ではなく、ここから受け取ります。
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    node_name: &'a str,
    service_name: &'a ServiceName,
    header: &'a RequestHeader,
}

impl<'a> RequestContext<'a> {
    pub fn new(node_name: &'a str, service_name: &'a ServiceName, header: &'a RequestHeader) -> Self {
        Self {
            node_name,
            service_name,
            header,
        }
    }

    pub fn node_name(&self) -> &'a str {
        self.node_name
    }

    pub fn service_name(&self) -> &'a ServiceName {
        self.service_name
    }

    pub fn header(&self) -> &'a RequestHeader {
        self.header
    }

    pub fn request_id(&self) -> CorrelationId {
        self.header.request_id()
    }
}

/// Handler はリクエストを受け取り、レスポンスを埋める
///
/// # 使用例
/// ```ignore
/// struct Adder;
///
/// impl Handler<AddTwoInts> for Adder {
///     fn handle(
///         &self,
///         ctx: &RequestContext<'_>,
///         request: AddTwoIntsRequest,
///         response: &mut AddTwoIntsResponse,
///     ) -> Result<(), HandlerError> {
///         response.sum = request.a + request.b;
///         Ok(())
///     }
/// }
/// ```
///
/// # 同期実行
/// - handler は呼び出したスレッドをブロックします
/// - 同じサービスへの並行呼び出しをコアは直列化しません（`Send + Sync` が必要）
pub trait Handler<S: ServiceType>: Send + Sync {
    fn handle(
        &self,
        ctx: &RequestContext<'_>,
        request: S::Request,
        response: &mut S::Response,
    ) -> Result<(), HandlerError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// TypedHandler<S, H> を DynHandler に変換することで、
/// エンドポイントは `Arc<dyn DynHandler>` だけを保持できます。
pub trait DynHandler: Send + Sync {
    fn dispatch(
        &self,
        ctx: &RequestContext<'_>,
        request: &RawRequest,
    ) -> Result<RawResponse, DispatchError>;

    fn service_type(&self) -> &'static str;
}

/// 1 つの Handler を 1 つの ServiceType に固定するアダプタ
///
/// 生成時に handler を受け取り、その後の差し替えはできません。
pub struct TypedHandler<S: ServiceType, H: Handler<S>> {
    handler: H,
    _marker: PhantomData<fn() -> S>,
}

impl<S: ServiceType, H: Handler<S>> TypedHandler<S, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<S: ServiceType, H: Handler<S>> DynHandler for TypedHandler<S, H> {
    fn dispatch(
        &self,
        ctx: &RequestContext<'_>,
        request: &RawRequest,
    ) -> Result<RawResponse, DispatchError> {
        if request.service_type() != S::TYPE {
            return Err(DispatchError::TypeMismatch {
                expected: S::TYPE.to_string(),
                actual: request.service_type().to_string(),
            });
        }
        let typed: S::Request =
            PayloadCodec::decode(request.payload()).map_err(DispatchError::Decode)?;

        let mut response = S::Response::default();
        self.handler.handle(ctx, typed, &mut response)?;

        PayloadCodec::encode_response(S::TYPE, &response).map_err(DispatchError::Encode)
    }

    fn service_type(&self) -> &'static str {
        S::TYPE
    }
}

/// `(ctx, request, &mut response)` 形式のクロージャを Handler にする
pub struct FnHandler<S, F> {
    f: F,
    _marker: PhantomData<fn() -> S>,
}

pub fn from_fn<S, F>(f: F) -> FnHandler<S, F>
where
    S: ServiceType,
    F: Fn(&RequestContext<'_>, S::Request, &mut S::Response) -> Result<(), HandlerError>
        + Send
        + Sync,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

impl<S, F> Handler<S> for FnHandler<S, F>
where
    S: ServiceType,
    F: Fn(&RequestContext<'_>, S::Request, &mut S::Response) -> Result<(), HandlerError>
        + Send
        + Sync,
{
    fn handle(
        &self,
        ctx: &RequestContext<'_>,
        request: S::Request,
        response: &mut S::Response,
    ) -> Result<(), HandlerError> {
        (self.f)(ctx, request, response)
    }
}

/// `request -> response` 形式のクロージャを Handler にする
pub struct SimpleFnHandler<S, F> {
    f: F,
    _marker: PhantomData<fn() -> S>,
}

pub fn from_simple_fn<S, F>(f: F) -> SimpleFnHandler<S, F>
where
    S: ServiceType,
    F: Fn(S::Request) -> S::Response + Send + Sync,
{
    SimpleFnHandler {
        f,
        _marker: PhantomData,
    }
}

impl<S, F> Handler<S> for SimpleFnHandler<S, F>
where
    S: ServiceType,
    F: Fn(S::Request) -> S::Response + Send + Sync,
{
    fn handle(
        &self,
        _ctx: &RequestContext<'_>,
        request: S::Request,
        response: &mut S::Response,
    ) -> Result<(), HandlerError> {
        *response = (self.f)(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClientGid;
    use crate::typed::interfaces::{
        AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse, Trigger, TriggerRequest,
    };
    use chrono::Utc;
    use ulid::Ulid;

    struct Adder;

    impl Handler<AddTwoInts> for Adder {
        fn handle(
            &self,
            _ctx: &RequestContext<'_>,
            request: AddTwoIntsRequest,
            response: &mut AddTwoIntsResponse,
        ) -> Result<(), HandlerError> {
            if request.a < 0 && request.b < 0 {
                return Err(HandlerError::new("both operands negative"));
            }
            response.sum = request.a + request.b;
            Ok(())
        }
    }

    fn header(seq: i64) -> RequestHeader {
        let id = CorrelationId::new(ClientGid::from_ulid(Ulid::new()), seq);
        RequestHeader::new(id, Utc::now(), Utc::now())
    }

    fn dispatch_add(handler: &dyn DynHandler, a: i64, b: i64) -> Result<RawResponse, DispatchError> {
        let name = ServiceName::new("add_two_ints").unwrap();
        let header = header(1);
        let ctx = RequestContext::new("test_node", &name, &header);
        let raw = PayloadCodec::encode_request(AddTwoInts::TYPE, &AddTwoIntsRequest { a, b }).unwrap();
        handler.dispatch(&ctx, &raw)
    }

    #[test]
    fn typed_handler_fills_response() {
        let typed = TypedHandler::<AddTwoInts, _>::new(Adder);
        let raw = dispatch_add(&typed, 3, 4).unwrap();

        assert_eq!(raw.service_type(), AddTwoInts::TYPE);
        let response: AddTwoIntsResponse = PayloadCodec::decode(raw.payload()).unwrap();
        assert_eq!(response.sum, 7);
    }

    #[test]
    fn handler_error_propagates() {
        let typed = TypedHandler::<AddTwoInts, _>::new(Adder);
        let err = dispatch_add(&typed, -1, -1).unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
    }

    #[test]
    fn mismatched_service_type_is_rejected_before_decode() {
        let typed = TypedHandler::<AddTwoInts, _>::new(Adder);
        let name = ServiceName::new("add_two_ints").unwrap();
        let header = header(2);
        let ctx = RequestContext::new("test_node", &name, &header);
        let raw = PayloadCodec::encode_request(Trigger::TYPE, &TriggerRequest {}).unwrap();

        let err = typed.dispatch(&ctx, &raw).unwrap_err();
        assert!(matches!(err, DispatchError::TypeMismatch { .. }));
    }

    #[test]
    fn undecodable_payload_is_a_decode_error() {
        let typed = TypedHandler::<AddTwoInts, _>::new(Adder);
        let name = ServiceName::new("add_two_ints").unwrap();
        let header = header(3);
        let ctx = RequestContext::new("test_node", &name, &header);
        let raw = RawRequest::new(AddTwoInts::TYPE, b"{\"a\":\"x\"}".to_vec());

        let err = typed.dispatch(&ctx, &raw).unwrap_err();
        assert!(matches!(err, DispatchError::Decode(_)));
    }

    #[test]
    fn closure_handlers_see_the_request_id() {
        let handler = from_fn::<AddTwoInts, _>(|ctx, request, response| {
            response.sum = request.a + request.b + ctx.request_id().sequence_number();
            Ok(())
        });
        let typed = TypedHandler::<AddTwoInts, _>::new(handler);
        let raw = dispatch_add(&typed, 1, 1).unwrap();
        let response: AddTwoIntsResponse = PayloadCodec::decode(raw.payload()).unwrap();
        assert_eq!(response.sum, 3);
    }

    #[test]
    fn simple_fn_handler() {
        let handler =
            from_simple_fn::<AddTwoInts, _>(|r| AddTwoIntsResponse { sum: r.a * r.b });
        let typed = TypedHandler::<AddTwoInts, _>::new(handler);
        assert_eq!(typed.service_type(), AddTwoInts::TYPE);

        let raw = dispatch_add(&typed, 6, 7).unwrap();
        let response: AddTwoIntsResponse = PayloadCodec::decode(raw.payload()).unwrap();
        assert_eq!(response.sum, 42);
    }
}
