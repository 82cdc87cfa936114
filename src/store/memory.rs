//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于内存的缓存存储。

use super::{CacheEntry, CacheStore, TypeStats};
use crate::entity::{EntityId, EntityType};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// 内存缓存存储
///
/// 以 (类型, 标识) 分组保存条目；写入经由 DashMap 的 entry API，
/// 同一实例的并发写入在分片锁上串行化
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<(EntityType, EntityId), HashMap<String, Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 条目总数
    pub fn len(&self) -> usize {
        self.entries.iter().map(|group| group.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&(entity_type.clone(), entity_id))
            .and_then(|group| group.get(name).cloned()))
    }

    async fn get_many(
        &self,
        entity_type: &EntityType,
        ids: &[EntityId],
    ) -> Result<Vec<CacheEntry>> {
        let mut result = Vec::new();
        for id in ids {
            if let Some(group) = self.entries.get(&(entity_type.clone(), *id)) {
                result.extend(group.iter().map(|(name, value)| CacheEntry {
                    entity_type: entity_type.clone(),
                    entity_id: *id,
                    property_name: name.clone(),
                    value: value.clone(),
                }));
            }
        }
        Ok(result)
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn upsert(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        let created = self
            .entries
            .entry((entity_type.clone(), entity_id))
            .or_default()
            .insert(name.to_string(), value)
            .is_none();
        debug!("memory upsert: created={}", created);
        Ok(())
    }

    async fn delete(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
    ) -> Result<bool> {
        let key = (entity_type.clone(), entity_id);
        let removed = match self.entries.get_mut(&key) {
            Some(mut group) => group.remove(name).is_some(),
            None => false,
        };
        self.entries.remove_if(&key, |_, group| group.is_empty());
        Ok(removed)
    }

    async fn delete_all(&self, entity_type: &EntityType, entity_id: EntityId) -> Result<u64> {
        Ok(self
            .entries
            .remove(&(entity_type.clone(), entity_id))
            .map(|(_, group)| group.len() as u64)
            .unwrap_or(0))
    }

    async fn stats(&self) -> Result<Vec<TypeStats>> {
        let mut counts: BTreeMap<EntityType, u64> = BTreeMap::new();
        for group in self.entries.iter() {
            *counts.entry(group.key().0.clone()).or_default() += group.value().len() as u64;
        }
        Ok(counts
            .into_iter()
            .map(|(entity_type, entries)| TypeStats {
                entity_type,
                entries,
            })
            .collect())
    }

    async fn clear(&self) -> Result<u64> {
        let total = self.len() as u64;
        self.entries.clear();
        Ok(total)
    }
}
