//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存存储：以 (实体类型, 实体标识, 属性名) 为唯一键的持久化表。
//!
//! 存储层只负责数据访问，不包含任何失效策略。

pub mod memory;
pub mod sql;

use crate::entity::{EntityId, EntityType};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use memory::MemoryCacheStore;
pub use sql::SqlCacheStore;

/// 缓存条目
///
/// (entity_type, entity_id, property_name) 三元组唯一
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub property_name: String,
    /// 序列化后的属性值
    pub value: Vec<u8>,
}

/// 单个实体类型的条目统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub entity_type: EntityType,
    pub entries: u64,
}

/// 缓存存储特征
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 读取单个条目的值
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// 批量读取若干实例的全部条目
    ///
    /// 结果无序，没有条目的标识不会出现在结果中
    async fn get_many(&self, entity_type: &EntityType, ids: &[EntityId])
        -> Result<Vec<CacheEntry>>;

    /// 插入或原地覆盖条目
    async fn upsert(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
        value: Vec<u8>,
    ) -> Result<()>;

    /// 删除单个条目，返回条目是否存在
    async fn delete(&self, entity_type: &EntityType, entity_id: EntityId, name: &str)
        -> Result<bool>;

    /// 删除某实例的全部条目，返回删除数量
    async fn delete_all(&self, entity_type: &EntityType, entity_id: EntityId) -> Result<u64>;

    /// 按实体类型统计条目数量
    async fn stats(&self) -> Result<Vec<TypeStats>>;

    /// 清空全部条目，返回删除数量
    async fn clear(&self) -> Result<u64>;
}
