//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 基于内存的实体存储，同时充当生命周期事件源。

use super::{Entity, EntityId, EntityRef, EntityStore, EntityType};
use crate::error::Result;
use crate::events::{EventDispatcher, EventKind};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// 内存实体存储
///
/// 保存成功后派发 `Saved` 事件，删除前派发 `Deleted` 事件；
/// `Deleted` 事件处理失败时实体不会被移除
pub struct MemoryEntityStore {
    entities: DashMap<EntityType, BTreeMap<EntityId, EntityRef>>,
    dispatcher: Arc<EventDispatcher>,
}

impl MemoryEntityStore {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            entities: DashMap::new(),
            dispatcher,
        }
    }

    /// 该存储使用的事件派发器
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// 为指定类型分配下一个可用的实例标识
    pub fn next_id(&self, entity_type: &EntityType) -> EntityId {
        self.entities
            .get(entity_type)
            .and_then(|instances| instances.keys().next_back().copied())
            .unwrap_or(0)
            + 1
    }

    /// 某类型当前的实例数量
    pub fn count(&self, entity_type: &EntityType) -> usize {
        self.entities
            .get(entity_type)
            .map(|instances| instances.len())
            .unwrap_or(0)
    }
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new(Arc::new(EventDispatcher::new()))
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn fetch_by_type(&self, entity_type: &EntityType) -> Result<Vec<EntityRef>> {
        Ok(self
            .entities
            .get(entity_type)
            .map(|instances| instances.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_by_type_and_ids(
        &self,
        entity_type: &EntityType,
        ids: &[EntityId],
    ) -> Result<Vec<EntityRef>> {
        let Some(instances) = self.entities.get(entity_type) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| instances.get(id).cloned())
            .collect())
    }

    #[instrument(skip(self, entity), level = "debug", fields(entity_type = %entity.entity_type(), entity_id = entity.id()))]
    async fn create(&self, entity: EntityRef) -> Result<()> {
        self.entities
            .entry(entity.entity_type())
            .or_default()
            .insert(entity.id(), entity.clone());
        debug!("实体已保存，派发 Saved 事件");
        self.dispatcher.dispatch(entity, EventKind::Saved).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, entity_type: &EntityType, id: EntityId) -> Result<bool> {
        let Some(entity) = self.fetch_one(entity_type, id).await? else {
            debug!("实体不存在，忽略删除");
            return Ok(false);
        };

        self.dispatcher.dispatch(entity, EventKind::Deleted).await?;

        if let Some(mut instances) = self.entities.get_mut(entity_type) {
            instances.remove(&id);
        }
        debug!("实体已删除");
        Ok(true)
    }
}
