//! ServiceType trait - service_type と Request/Response 型の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Associated Types (`type Request`, `type Response`)
//! - Response は `Default` で空の値から組み立てる

use serde::Serialize;
use serde::de::DeserializeOwned;

/// ServiceType は 1 つのサービス型（Request/Response の組）を表す
///
/// # 使用例
/// ```ignore
/// pub enum AddTwoInts {}
///
/// impl ServiceType for AddTwoInts {
///     const TYPE: &'static str = "example_interfaces/srv/AddTwoInts";
///     type Request = AddTwoIntsRequest;
///     type Response = AddTwoIntsResponse;
/// }
/// ```
///
/// # Trait Bounds
/// - `Request`, `Response` は serde でエンコード可能
/// - `Response: Default`: handler に渡す空のレスポンスを作るため
/// - `'static`: Arc<dyn DynHandler> に格納できるため
pub trait ServiceType: Send + Sync + 'static {
    /// `{package}/srv/{Name}` の形式
    const TYPE: &'static str;

    type Request: Serialize + DeserializeOwned + Send + 'static;
    type Response: Serialize + DeserializeOwned + Default + Send + 'static;
}
