//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了实体生命周期事件及其派发机制。
//!
//! 订阅以 (实体类型, 事件类型) 为键，每个订阅带有确定性的 `dispatch_uid`，
//! 使用相同 `dispatch_uid` 重复订阅会替换原订阅而不是叠加。

use crate::entity::{EntityRef, EntityType};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 生命周期事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// 实例被创建或更新之后
    Saved,
    /// 实例被删除之前
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Saved => f.write_str("saved"),
            EventKind::Deleted => f.write_str("deleted"),
        }
    }
}

/// 事件处理器特征
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, instance: EntityRef, kind: EventKind) -> Result<()>;
}

/// 一条事件订阅
#[derive(Clone)]
pub struct Subscription {
    pub sender: EntityType,
    pub kind: EventKind,
    pub dispatch_uid: String,
    pub handler: Arc<dyn EventHandler>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("sender", &self.sender)
            .field("kind", &self.kind)
            .field("dispatch_uid", &self.dispatch_uid)
            .finish()
    }
}

type Receivers = Vec<(String, Arc<dyn EventHandler>)>;

/// 事件派发器
///
/// 同一 (类型, 事件) 下的处理器按订阅顺序依次调用
pub struct EventDispatcher {
    receivers: RwLock<HashMap<(EntityType, EventKind), Receivers>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            receivers: RwLock::new(HashMap::new()),
        }
    }

    /// 订阅事件
    ///
    /// 返回是否替换了已有的同名订阅
    pub async fn connect(&self, subscription: Subscription) -> bool {
        let mut receivers = self.receivers.write().await;
        Self::insert(&mut receivers, subscription)
    }

    /// 取消订阅
    pub async fn disconnect(&self, sender: &EntityType, kind: EventKind, dispatch_uid: &str) -> bool {
        let mut receivers = self.receivers.write().await;
        let Some(list) = receivers.get_mut(&(sender.clone(), kind)) else {
            return false;
        };
        let before = list.len();
        list.retain(|(uid, _)| uid != dispatch_uid);
        before != list.len()
    }

    /// 原子地替换某一前缀下的全部订阅
    ///
    /// 先移除 `dispatch_uid` 以 `prefix` 开头的订阅，再按顺序加入新订阅，
    /// 整个过程持有同一把写锁
    pub async fn replace_owned(&self, prefix: &str, subscriptions: Vec<Subscription>) -> usize {
        self.replace_owned_with(prefix, subscriptions, || async {}).await
    }

    /// 与 [`replace_owned`](Self::replace_owned) 相同，`commit` 在持有写锁期间执行
    ///
    /// 派发事件需要先获取读锁，因此 `commit` 中的状态变更与订阅替换
    /// 对事件来说是同时生效的。`commit` 不得再访问本派发器
    pub async fn replace_owned_with<F, Fut>(
        &self,
        prefix: &str,
        subscriptions: Vec<Subscription>,
        commit: F,
    ) -> usize
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut receivers = self.receivers.write().await;
        commit().await;
        for list in receivers.values_mut() {
            list.retain(|(uid, _)| !uid.starts_with(prefix));
        }
        receivers.retain(|_, list| !list.is_empty());

        let count = subscriptions.len();
        for subscription in subscriptions {
            Self::insert(&mut receivers, subscription);
        }
        count
    }

    /// 某 (类型, 事件) 下的订阅标识，按调用顺序排列
    pub async fn receivers(&self, sender: &EntityType, kind: EventKind) -> Vec<String> {
        self.receivers
            .read()
            .await
            .get(&(sender.clone(), kind))
            .map(|list| list.iter().map(|(uid, _)| uid.clone()).collect())
            .unwrap_or_default()
    }

    /// 派发事件
    ///
    /// 所有处理器都会被调用；任何处理器失败都会在全部调用结束后返回给调用方
    pub async fn dispatch(&self, instance: EntityRef, kind: EventKind) -> Result<()> {
        let sender = instance.entity_type();
        let handlers: Vec<(String, Arc<dyn EventHandler>)> = self
            .receivers
            .read()
            .await
            .get(&(sender.clone(), kind))
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            return Ok(());
        }

        debug!(
            "派发事件: type={}, id={}, kind={}, receivers={}",
            sender,
            instance.id(),
            kind,
            handlers.len()
        );

        let mut failures = Vec::new();
        for (uid, handler) in handlers {
            if let Err(e) = handler.handle(instance.clone(), kind).await {
                warn!("事件处理器 {} 失败: {}", uid, e);
                match e {
                    CacheError::Invalidation(inner) => failures.extend(inner),
                    other => failures.push(other),
                }
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(CacheError::Invalidation(failures)),
        }
    }

    fn insert(
        receivers: &mut HashMap<(EntityType, EventKind), Receivers>,
        subscription: Subscription,
    ) -> bool {
        let list = receivers
            .entry((subscription.sender, subscription.kind))
            .or_default();
        if let Some(slot) = list
            .iter_mut()
            .find(|(uid, _)| *uid == subscription.dispatch_uid)
        {
            slot.1 = subscription.handler;
            true
        } else {
            list.push((subscription.dispatch_uid, subscription.handler));
            false
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
