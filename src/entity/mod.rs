//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了实体模型的抽象：类型标识、实体存储接口以及属性访问器。
//!
//! 属性缓存本身不关心实体如何持久化，只通过 [`Entity`] 和 [`EntityStore`]
//! 两个边界与外部的对象存储交互。

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub use memory::MemoryEntityStore;

/// 实体实例的标识符
pub type EntityId = u64;

/// 缓存属性的值
///
/// 任何可以被序列化器往返的结构化数据
pub type PropertyValue = serde_json::Value;

/// 共享的实体引用
pub type EntityRef = Arc<dyn Entity>;

/// 实体类型标识
///
/// 在进程内及持久化形式中保持稳定，唯一标识一种实体模式
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
    /// 从静态字符串创建类型标识，可用于常量
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// 创建类型标识
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for EntityType {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// 实体特征
///
/// 所有参与属性缓存的实体（无论是目标类型还是源类型）都需要实现
pub trait Entity: Send + Sync + 'static {
    /// 实体类型标识
    fn entity_type(&self) -> EntityType;

    /// 实体实例标识
    fn id(&self) -> EntityId;

    /// 按名称取得属性访问器
    ///
    /// 不存在该属性时返回 `None`
    fn property(&self, name: &str) -> Option<PropertyAccessor>;

    /// 转换为 Any，用于在解析器中向下转型
    fn as_any(&self) -> &dyn Any;
}

impl<T: Entity + ?Sized> Entity for Arc<T> {
    fn entity_type(&self) -> EntityType {
        (**self).entity_type()
    }

    fn id(&self) -> EntityId {
        (**self).id()
    }

    fn property(&self, name: &str) -> Option<PropertyAccessor> {
        (**self).property(name)
    }

    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }
}

/// 将实体向下转型为具体类型
pub fn downcast<T: Entity>(entity: &dyn Entity) -> Option<&T> {
    entity.as_any().downcast_ref::<T>()
}

/// 计算型属性返回的 future
pub type ComputeFuture = BoxFuture<'static, Result<PropertyValue>>;

type ComputeFn = Box<dyn FnOnce(Arc<dyn EntityStore>) -> ComputeFuture + Send>;

/// 属性访问器
///
/// 属性既可以是直接存储的字段，也可以是需要调用才能得到的计算值，
/// 二者在重新计算时被统一解析
pub enum PropertyAccessor {
    /// 直接存储的值
    Stored(PropertyValue),
    /// 计算型属性，可以通过实体存储读取关联实体
    Computed(ComputeFn),
}

impl PropertyAccessor {
    /// 创建存储型访问器
    pub fn stored(value: impl Into<PropertyValue>) -> Self {
        PropertyAccessor::Stored(value.into())
    }

    /// 创建计算型访问器
    pub fn computed<F, Fut>(compute: F) -> Self
    where
        F: FnOnce(Arc<dyn EntityStore>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<PropertyValue>> + Send + 'static,
    {
        PropertyAccessor::Computed(Box::new(move |entities| Box::pin(compute(entities))))
    }

    /// 解析出属性值
    pub async fn resolve(self, entities: Arc<dyn EntityStore>) -> Result<PropertyValue> {
        match self {
            PropertyAccessor::Stored(value) => Ok(value),
            PropertyAccessor::Computed(compute) => compute(entities).await,
        }
    }
}

impl fmt::Debug for PropertyAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyAccessor::Stored(value) => f.debug_tuple("Stored").field(value).finish(),
            PropertyAccessor::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// 实体存储特征
///
/// 外部对象存储需要向属性缓存暴露的最小能力
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// 获取某类型的全部实例
    async fn fetch_by_type(&self, entity_type: &EntityType) -> Result<Vec<EntityRef>>;

    /// 按类型和标识批量获取实例，缺失的标识会被忽略
    async fn fetch_by_type_and_ids(
        &self,
        entity_type: &EntityType,
        ids: &[EntityId],
    ) -> Result<Vec<EntityRef>>;

    /// 创建或更新实例
    async fn create(&self, entity: EntityRef) -> Result<()>;

    /// 删除实例，返回实例是否存在
    async fn delete(&self, entity_type: &EntityType, id: EntityId) -> Result<bool>;

    /// 获取单个实例
    async fn fetch_one(&self, entity_type: &EntityType, id: EntityId) -> Result<Option<EntityRef>> {
        Ok(self
            .fetch_by_type_and_ids(entity_type, &[id])
            .await?
            .into_iter()
            .next())
    }
}
