//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了解析器：把发生变化的源实例映射为受影响的目标实例。

use crate::entity::{EntityRef, EntityStore, EntityType};
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// 解析器特征
///
/// 解析器不得修改状态，但可以通过 `entities` 查询存储。
/// 返回空列表表示本次事件不影响任何目标实例。
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(
        &self,
        source: EntityRef,
        entities: Arc<dyn EntityStore>,
    ) -> Result<Vec<EntityRef>>;

    /// 日志中使用的名称
    fn name(&self) -> &str;
}

/// 基于闭包的解析器
pub struct FnResolver<F> {
    name: String,
    resolve: F,
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(EntityRef, Arc<dyn EntityStore>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<EntityRef>>> + Send + 'static,
{
    async fn resolve(
        &self,
        source: EntityRef,
        entities: Arc<dyn EntityStore>,
    ) -> Result<Vec<EntityRef>> {
        (self.resolve)(source, entities).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 用闭包创建解析器
///
/// # 示例
///
/// ```ignore
/// let resolver = resolver_fn("leaves_of_mid", |mid, entities| async move {
///     let leaves = entities.fetch_by_type(&LEAF).await?;
///     Ok(leaves.into_iter().filter(|l| parent_of(l) == mid.id()).collect())
/// });
/// ```
pub fn resolver_fn<F, Fut>(name: impl Into<String>, resolve: F) -> Arc<dyn Resolver>
where
    F: Fn(EntityRef, Arc<dyn EntityStore>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<EntityRef>>> + Send + 'static,
{
    Arc::new(FnResolver {
        name: name.into(),
        resolve,
    })
}

/// 自身规则使用的解析器：按标识重新加载实例本身
pub struct IdentityResolver {
    entity_type: EntityType,
    name: String,
}

impl IdentityResolver {
    pub fn new(entity_type: EntityType) -> Self {
        let name = format!("update_self<{}>", entity_type);
        Self { entity_type, name }
    }
}

#[async_trait]
impl Resolver for IdentityResolver {
    async fn resolve(
        &self,
        source: EntityRef,
        entities: Arc<dyn EntityStore>,
    ) -> Result<Vec<EntityRef>> {
        entities
            .fetch_by_type_and_ids(&self.entity_type, &[source.id()])
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
