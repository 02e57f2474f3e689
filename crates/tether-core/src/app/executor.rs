//! Executor - トランスポートの配送をエンドポイントへ届けるループ（spin）
//!
//! # フロー
//! 1. Transport::next_delivery() で 1 件取得
//! 2. サービス名でノードのテーブルを引く
//! 3. 登録トークンが一致すれば ServiceEndpoint::handle_request
//!
//! 配送は 1 件ずつ直列に処理します（シングルスレッド executor 相当）。
//! 見つからない・古いトークンの配送は handler に届けず、ログだけ残します。

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::context::Context;
use super::endpoint::Disposition;
use super::node::Node;
use crate::domain::EndpointError;
use crate::ports::Delivery;

/// What happened to one delivery.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Dispatched(Disposition),
    Refused(EndpointError),
    /// No live endpoint owns this delivery; nothing was dispatched.
    Unroutable,
}

pub struct Executor {
    context: Arc<Context>,
    nodes: Vec<Arc<Node>>,
}

impl Executor {
    pub fn new(context: &Arc<Context>) -> Self {
        Self {
            context: Arc::clone(context),
            nodes: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: Arc<Node>) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Route one delivery synchronously.
    pub fn route(&self, delivery: Delivery) -> DeliveryOutcome {
        let endpoint = self
            .nodes
            .iter()
            .find_map(|node| node.service(&delivery.service));

        let Some(endpoint) = endpoint else {
            debug!(service = %delivery.service, request_id = %delivery.header.request_id(), "no service for delivery");
            return DeliveryOutcome::Unroutable;
        };
        if endpoint.token() != delivery.token {
            debug!(
                service = %delivery.service,
                request_id = %delivery.header.request_id(),
                token = %delivery.token,
                "stale delivery for a replaced service"
            );
            return DeliveryOutcome::Unroutable;
        }

        match endpoint.handle_request(&delivery.header, &delivery.request) {
            Ok(disposition) => DeliveryOutcome::Dispatched(disposition),
            Err(err) => {
                warn!(
                    service = %delivery.service,
                    request_id = %delivery.header.request_id(),
                    error = %err,
                    "delivery refused"
                );
                DeliveryOutcome::Refused(err)
            }
        }
    }

    /// Wait for and route one delivery. `None` once the transport is closed.
    pub async fn spin_once(&self) -> Option<DeliveryOutcome> {
        let delivery = self.context.transport().next_delivery().await?;
        Some(self.route(delivery))
    }

    /// Route deliveries until the context shuts down or the transport closes.
    pub async fn spin(&self) {
        let mut shutdown_rx = self.context.shutdown_signal();
        let transport = self.context.transport();
        info!(nodes = self.nodes.len(), "executor spinning");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let delivery = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                delivery = transport.next_delivery() => delivery,
            };

            let Some(delivery) = delivery else {
                debug!("transport closed");
                break;
            };
            self.route(delivery);
        }
        info!("executor stopped");
    }
}
