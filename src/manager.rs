//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了属性缓存的入口，负责组装存储、失效引擎和事件订阅。

use crate::bootstrap::{bootstrap, BootstrapReport};
use crate::config::{Config, StoreBackend, StoreConfig};
use crate::declaration::ModelDescriptor;
use crate::engine::{InvalidationEngine, ReactionReport};
use crate::entity::{Entity, EntityId, EntityRef, EntityStore, EntityType, PropertyValue};
use crate::error::{CacheError, Result};
use crate::events::{EventDispatcher, EventKind};
use crate::hydration::{self, Hydrated};
use crate::registry::{DependencyRule, InstalledRule};
use crate::serialization::{Serializer, SerializerEnum};
use crate::store::{CacheStore, MemoryCacheStore, SqlCacheStore};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// 属性缓存
///
/// 实体存储通过 `dispatcher` 派发生命周期事件，启动注册之后
/// 这些事件会自动驱动缓存的重新计算和清除
pub struct PropertyCache {
    engine: Arc<InvalidationEngine>,
    dispatcher: Arc<EventDispatcher>,
    bootstrap_lock: Mutex<()>,
}

impl PropertyCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        entities: Arc<dyn EntityStore>,
        dispatcher: Arc<EventDispatcher>,
        serializer: SerializerEnum,
    ) -> Self {
        Self {
            engine: Arc::new(InvalidationEngine::new(store, entities, serializer)),
            dispatcher,
            bootstrap_lock: Mutex::new(()),
        }
    }

    /// 按配置创建属性缓存
    #[instrument(skip_all, level = "info")]
    pub async fn from_config(
        config: &Config,
        entities: Arc<dyn EntityStore>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;
        let store = open_store(&config.store).await?;
        Ok(Self::new(store, entities, dispatcher, config.serializer()))
    }

    /// 执行启动注册，可重复调用
    ///
    /// 同一时刻只有一次启动注册在运行
    pub async fn bootstrap(&self, models: &[ModelDescriptor]) -> Result<BootstrapReport> {
        let _guard = self.bootstrap_lock.lock().await;
        bootstrap(&self.engine, &self.dispatcher, models).await
    }

    /// 已安装的规则
    pub async fn installed_rules(&self) -> Vec<InstalledRule> {
        self.engine.registry().await.installed_rules().to_vec()
    }

    /// 目标类型声明的缓存属性
    pub async fn cached_properties(&self, entity_type: &EntityType) -> Option<Vec<String>> {
        self.engine
            .registry()
            .await
            .cached_properties(entity_type)
            .map(<[String]>::to_vec)
    }

    /// 批量附加缓存属性
    pub async fn hydrate<E: Entity>(
        &self,
        entity_type: &EntityType,
        instances: Vec<E>,
    ) -> Result<Vec<Hydrated<E>>> {
        let properties = self
            .cached_properties(entity_type)
            .await
            .ok_or_else(|| CacheError::NotRegistered(entity_type.to_string()))?;
        hydration::hydrate(
            self.engine.store().as_ref(),
            self.engine.serializer(),
            entity_type,
            &properties,
            instances,
        )
        .await
    }

    /// 从实体存储加载实例并附加缓存属性
    #[instrument(skip(self, ids), level = "debug", fields(ids = ids.len()))]
    pub async fn fetch_with_properties(
        &self,
        entity_type: &EntityType,
        ids: &[EntityId],
    ) -> Result<Vec<Hydrated<EntityRef>>> {
        let instances = self
            .engine
            .entities()
            .fetch_by_type_and_ids(entity_type, ids)
            .await?;
        self.hydrate(entity_type, instances).await
    }

    /// 读取单个缓存值
    pub async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
    ) -> Result<Option<PropertyValue>> {
        match self.engine.store().get(entity_type, entity_id, name).await? {
            Some(bytes) => Ok(Some(self.engine.serializer().decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 读取单个缓存值并反序列化为指定类型
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
    ) -> Result<Option<T>> {
        match self.engine.store().get(entity_type, entity_id, name).await? {
            Some(bytes) => Ok(Some(self.engine.serializer().deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 直接处理一个生命周期事件
    ///
    /// 适用于不经过事件派发器的调用方，例如外部消息队列重放事件
    pub async fn react(&self, instance: EntityRef, kind: EventKind) -> Result<ReactionReport> {
        self.engine.react(instance, kind).await
    }

    /// 针对一个实例单独执行一条未注册的规则
    pub async fn apply_rule(
        &self,
        rule: &DependencyRule,
        instance: EntityRef,
        kind: EventKind,
    ) -> Result<ReactionReport> {
        self.engine.apply_rule(rule, instance, kind).await
    }

    pub fn engine(&self) -> &Arc<InvalidationEngine> {
        &self.engine
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        self.engine.store()
    }

    pub fn entities(&self) -> &Arc<dyn EntityStore> {
        self.engine.entities()
    }
}

/// 按存储配置打开缓存存储
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn CacheStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory property cache store");
            Ok(Arc::new(MemoryCacheStore::new()))
        }
        StoreBackend::Database => Ok(Arc::new(SqlCacheStore::connect(config).await?)),
    }
}
