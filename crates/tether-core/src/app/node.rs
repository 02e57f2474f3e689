//! Node - サービステーブルと create_service（登録ファサード）
//!
//! # 学習ポイント
//! - HashMap での型消去された endpoint の管理
//! - Generic methods での登録と型安全性
//! - テーブルが唯一の所有者、呼び出し側には Weak ハンドルを返す
//!
//! # 登録の原子性
//! 名前の検証・重複チェック・トランスポート登録・テーブル挿入は
//! ノードのロックを 1 回取ったまま行います。途中で失敗した場合は何も残りません。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::info;

use super::context::{Context, ContextState};
use super::endpoint::ServiceEndpoint;
use super::options::ServiceOptions;
use super::status::EndpointCounts;
use crate::domain::{NodeError, RegistrationError, ServiceName};
use crate::typed::{Handler, ServiceType, TypedHandler, from_simple_fn};

struct NodeInner {
    shut_down: bool,
    services: HashMap<ServiceName, Arc<ServiceEndpoint>>,
}

/// Node は名前付きサービスの集合を所有する
///
/// # 使用例
/// ```ignore
/// let context = Context::initialized(Arc::new(InMemoryTransport::new()));
/// let node = Node::new("minimal_service", &context)?;
/// let handle = node.create_service::<AddTwoInts, _>(
///     "add_two_ints",
///     from_fn::<AddTwoInts, _>(|_ctx, req, res| {
///         res.sum = req.a + req.b;
///         Ok(())
///     }),
///     ServiceOptions::default(),
/// )?;
/// ```
pub struct Node {
    name: String,
    context: Arc<Context>,
    inner: Mutex<NodeInner>,
}

impl Node {
    pub fn new(name: impl Into<String>, context: &Arc<Context>) -> Result<Arc<Self>, NodeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NodeError::EmptyName);
        }
        let node = Arc::new(Self {
            name,
            context: Arc::clone(context),
            inner: Mutex::new(NodeInner {
                shut_down: false,
                services: HashMap::new(),
            }),
        });
        context.track(&node);
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Register `handler` as service `service_name` of type `S`.
    ///
    /// The node's table owns the endpoint; the returned handle is advisory.
    pub fn create_service<S: ServiceType, H: Handler<S> + 'static>(
        self: &Arc<Self>,
        service_name: &str,
        handler: H,
        options: ServiceOptions,
    ) -> Result<ServiceHandle, RegistrationError> {
        let name = ServiceName::new(service_name)?;
        options.qos.validate()?;

        let mut inner = self.lock();
        self.ensure_ready(&inner)?;
        if inner.services.contains_key(&name) {
            return Err(RegistrationError::Duplicate(name));
        }

        let transport = self.context.transport();
        let token = transport.register_service(&name, S::TYPE, &options.qos)?;
        let endpoint = Arc::new(ServiceEndpoint::new(
            self.name.clone(),
            name.clone(),
            Box::new(TypedHandler::<S, H>::new(handler)),
            transport,
            token,
            options.on_handler_error,
        ));
        endpoint.mark_registered();
        inner.services.insert(name.clone(), Arc::clone(&endpoint));
        drop(inner);

        info!(
            node = %self.name,
            service = %name,
            service_type = S::TYPE,
            token = %token,
            "service created"
        );
        Ok(ServiceHandle {
            name,
            endpoint: Arc::downgrade(&endpoint),
            node: Arc::downgrade(self),
        })
    }

    /// `request -> response` shorthand with default options.
    pub fn create_service_fn<S, F>(
        self: &Arc<Self>,
        service_name: &str,
        f: F,
    ) -> Result<ServiceHandle, RegistrationError>
    where
        S: ServiceType,
        F: Fn(S::Request) -> S::Response + Send + Sync + 'static,
    {
        self.create_service::<S, _>(
            service_name,
            from_simple_fn::<S, F>(f),
            ServiceOptions::default(),
        )
    }

    pub fn service(&self, service_name: &ServiceName) -> Option<Arc<ServiceEndpoint>> {
        self.lock().services.get(service_name).cloned()
    }

    pub fn service_names(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.lock().services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tear down one service. Waits for its in-flight dispatch to finish.
    ///
    /// Returns false if no such service is registered.
    pub fn remove_service(&self, service_name: &str) -> bool {
        let Ok(name) = ServiceName::new(service_name) else {
            return false;
        };
        let removed = self.lock().services.remove(&name);
        match removed {
            Some(endpoint) => {
                endpoint.deregister();
                info!(node = %self.name, service = %name, "service removed");
                true
            }
            None => false,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// Tear down every service; no registration is accepted afterwards.
    pub fn shutdown(&self) {
        let endpoints: Vec<Arc<ServiceEndpoint>> = {
            let mut inner = self.lock();
            if inner.shut_down {
                return;
            }
            inner.shut_down = true;
            inner.services.drain().map(|(_, endpoint)| endpoint).collect()
        };
        for endpoint in &endpoints {
            endpoint.deregister();
        }
        info!(node = %self.name, services = endpoints.len(), "node shut down");
    }

    fn ensure_ready(&self, inner: &NodeInner) -> Result<(), RegistrationError> {
        let reason = if inner.shut_down {
            Some("node is shut down")
        } else {
            match self.context.state() {
                ContextState::Uninitialized => Some("context is not initialized"),
                ContextState::ShutDown => Some("context is shut down"),
                ContextState::Initialized if !self.context.transport().is_available() => {
                    Some("transport is not available")
                }
                ContextState::Initialized => None,
            }
        };
        match reason {
            Some(reason) => Err(RegistrationError::NotReady {
                node: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("services", &self.service_names())
            .finish()
    }
}

/// Non-owning handle to a registered service.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    name: ServiceName,
    endpoint: Weak<ServiceEndpoint>,
    node: Weak<Node>,
}

impl ServiceHandle {
    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    /// False once the service was removed or its node dropped.
    pub fn is_alive(&self) -> bool {
        self.endpoint
            .upgrade()
            .is_some_and(|endpoint| endpoint.state() == super::EndpointState::Registered)
    }

    pub fn stats(&self) -> Option<EndpointCounts> {
        self.endpoint.upgrade().map(|endpoint| endpoint.stats())
    }

    /// Remove the service from its node. Returns false if it was already gone.
    pub fn destroy(self) -> bool {
        match self.node.upgrade() {
            Some(node) => {
                let same = node
                    .service(&self.name)
                    .is_some_and(|current| Weak::ptr_eq(&Arc::downgrade(&current), &self.endpoint));
                same && node.remove_service(self.name.as_str())
            }
            None => false,
        }
    }
}
