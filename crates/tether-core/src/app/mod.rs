//! App - アプリケーション層
//!
//! このモジュールは、ports と typed を組み合わせてサービス処理を実装します。
//!
//! # 主要コンポーネント
//! - **Context**: init / shutdown のスコープ
//! - **Node**: サービステーブルと create_service（登録ファサード）
//! - **ServiceEndpoint**: 1 サービス分のリクエスト→レスポンス処理
//! - **Executor**: 配送ループ（spin）

pub mod context;
pub mod endpoint;
pub mod executor;
pub mod node;
pub mod options;
pub mod status;

pub use self::context::{Context, ContextState};
pub use self::endpoint::{Disposition, EndpointState, ServiceEndpoint};
pub use self::executor::{DeliveryOutcome, Executor};
pub use self::node::{Node, ServiceHandle};
pub use self::options::{HandlerErrorPolicy, ServiceOptions};
pub use self::status::EndpointCounts;
