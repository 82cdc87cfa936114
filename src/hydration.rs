//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了批量加载：一次存储查询为一批实例附加缓存属性。

use crate::entity::{Entity, EntityId, EntityType, PropertyValue};
use crate::error::{CacheError, Result};
use crate::serialization::{Serializer, SerializerEnum};
use crate::store::CacheStore;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::ops::Deref;
use tracing::{debug, instrument};

/// 附加到实例上的缓存属性
///
/// 按声明顺序保存；没有缓存条目的属性值为 `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedProperties {
    values: Vec<(String, Option<PropertyValue>)>,
}

impl CachedProperties {
    /// 缓存值，属性未缓存或未声明时返回 `None`
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values
            .iter()
            .find(|(declared, _)| declared == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// 将缓存值反序列化为指定类型
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.get(name)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| CacheError::Serialization(e.to_string()))
            })
            .transpose()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.values.iter().any(|(declared, _)| declared == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&PropertyValue>)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    /// 有缓存值的属性数量
    pub fn cached_count(&self) -> usize {
        self.values.iter().filter(|(_, value)| value.is_some()).count()
    }
}

/// 附加了缓存属性的实例
#[derive(Debug, Clone)]
pub struct Hydrated<E> {
    pub entity: E,
    pub properties: CachedProperties,
}

impl<E> Hydrated<E> {
    pub fn into_inner(self) -> E {
        self.entity
    }
}

impl<E> Deref for Hydrated<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entity
    }
}

/// 批量加载缓存属性
///
/// 空输入不访问存储；否则只调用一次 `get_many`。从不触发重新计算
#[instrument(skip_all, level = "debug", fields(entity_type = %entity_type, instances = instances.len()))]
pub async fn hydrate<E: Entity>(
    store: &dyn CacheStore,
    serializer: &SerializerEnum,
    entity_type: &EntityType,
    cached_properties: &[String],
    instances: Vec<E>,
) -> Result<Vec<Hydrated<E>>> {
    if instances.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(other) = instances.iter().find(|i| i.entity_type() != *entity_type) {
        return Err(CacheError::Entity(format!(
            "cannot hydrate {}#{} as {}",
            other.entity_type(),
            other.id(),
            entity_type
        )));
    }

    let mut ids: Vec<EntityId> = instances.iter().map(|i| i.id()).collect();
    ids.sort_unstable();
    ids.dedup();

    let entries = store.get_many(entity_type, &ids).await?;
    debug!("批量读取到 {} 个缓存条目", entries.len());

    let mut index: HashMap<EntityId, HashMap<String, Vec<u8>>> = HashMap::with_capacity(ids.len());
    for entry in entries {
        index
            .entry(entry.entity_id)
            .or_default()
            .insert(entry.property_name, entry.value);
    }

    let mut hydrated = Vec::with_capacity(instances.len());
    for entity in instances {
        let found = index.get(&entity.id());
        let mut values = Vec::with_capacity(cached_properties.len());
        for name in cached_properties {
            let value = match found.and_then(|entries| entries.get(name)) {
                Some(bytes) => Some(serializer.decode(bytes)?),
                None => None,
            };
            values.push((name.clone(), value));
        }
        hydrated.push(Hydrated {
            entity,
            properties: CachedProperties { values },
        });
    }
    Ok(hydrated)
}
