//! Context - init / shutdown のスコープ
//!
//! プロセス全体のグローバル状態の代わりに、明示的に受け渡す Context を使います。
//! Node と Executor は同じ Context を共有します。
//!
//! # 状態遷移
//! `Uninitialized -> Initialized -> ShutDown`

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::info;

use super::node::Node;
use crate::ports::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initialized,
    ShutDown,
}

pub struct Context {
    transport: Arc<dyn Transport>,
    state: Mutex<ContextState>,
    nodes: Mutex<Vec<Weak<Node>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Context {
    /// Uninitialized context; call [`Context::init`] before registering services.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            transport,
            state: Mutex::new(ContextState::Uninitialized),
            nodes: Mutex::new(Vec::new()),
            shutdown_tx,
        })
    }

    /// Create and initialize in one step.
    pub fn initialized(transport: Arc<dyn Transport>) -> Arc<Self> {
        let context = Self::new(transport);
        context.init();
        context
    }

    /// Returns false if the context was not in `Uninitialized`.
    pub fn init(&self) -> bool {
        let mut state = self.lock_state();
        if *state != ContextState::Uninitialized {
            return false;
        }
        *state = ContextState::Initialized;
        info!("context initialized");
        true
    }

    pub fn state(&self) -> ContextState {
        *self.lock_state()
    }

    /// Initialized and the transport is still up.
    pub fn is_valid(&self) -> bool {
        self.state() == ContextState::Initialized && self.transport.is_available()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Shut down every node created on this context and wake spinning
    /// executors. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            if *state == ContextState::ShutDown {
                return;
            }
            *state = ContextState::ShutDown;
        }

        let nodes: Vec<Arc<Node>> = self
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .filter_map(|node| node.upgrade())
            .collect();
        for node in nodes {
            node.shutdown();
        }

        // stored even with no receivers, so late subscribers see it
        self.shutdown_tx.send_replace(true);
        info!("context shut down");
    }

    pub(crate) fn track(&self, node: &Arc<Node>) {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        nodes.retain(|n| n.strong_count() > 0);
        nodes.push(Arc::downgrade(node));
    }

    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("state", &self.state()).finish()
    }
}
