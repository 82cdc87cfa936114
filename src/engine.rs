//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效引擎：响应实体生命周期事件，重新计算或清除受影响的缓存条目。

use crate::entity::{EntityRef, EntityStore, EntityType};
use crate::error::{CacheError, Result};
use crate::events::{EventHandler, EventKind};
use crate::registry::{DependencyRegistry, DependencyRule};
use crate::serialization::{Serializer, SerializerEnum};
use crate::store::CacheStore;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// 一次事件处理的结果
#[derive(Debug, Default)]
pub struct ReactionReport {
    /// 解析出至少一个目标实例的规则数
    pub rules_fired: usize,
    /// 解析失败或解析为空的规则数
    pub rules_skipped: usize,
    pub entries_written: u64,
    pub entries_evicted: u64,
    /// 解析和重新计算中记录的失败
    pub failures: Vec<CacheError>,
}

impl ReactionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// 存在失败时转换为 [`CacheError::Invalidation`]
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(CacheError::Invalidation(self.failures))
        }
    }
}

/// 失效引擎
///
/// 事件处理期间只读取一次注册表快照，启动注册可以在运行中整体替换注册表
pub struct InvalidationEngine {
    registry: RwLock<Arc<DependencyRegistry>>,
    store: Arc<dyn CacheStore>,
    entities: Arc<dyn EntityStore>,
    serializer: SerializerEnum,
}

impl InvalidationEngine {
    pub fn new(
        store: Arc<dyn CacheStore>,
        entities: Arc<dyn EntityStore>,
        serializer: SerializerEnum,
    ) -> Self {
        Self {
            registry: RwLock::new(Arc::new(DependencyRegistry::new())),
            store,
            entities,
            serializer,
        }
    }

    /// 当前注册表快照
    pub async fn registry(&self) -> Arc<DependencyRegistry> {
        self.registry.read().await.clone()
    }

    /// 替换注册表，返回旧的注册表
    pub async fn swap_registry(&self, registry: Arc<DependencyRegistry>) -> Arc<DependencyRegistry> {
        let mut guard = self.registry.write().await;
        std::mem::replace(&mut *guard, registry)
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn entities(&self) -> &Arc<dyn EntityStore> {
        &self.entities
    }

    pub fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    /// 处理一个生命周期事件，触发源类型下的全部规则
    ///
    /// 存储层错误会立即中止处理并返回；解析和重新计算的失败记录在报告中
    #[instrument(skip(self, instance), level = "debug", fields(entity_type = %instance.entity_type(), entity_id = instance.id()))]
    pub async fn react(&self, instance: EntityRef, kind: EventKind) -> Result<ReactionReport> {
        self.run(instance, kind, None).await
    }

    /// 只触发目标类型为 `target` 的规则，由 (源类型, 目标类型) 订阅调用
    #[instrument(skip(self, instance), level = "debug", fields(entity_type = %instance.entity_type(), entity_id = instance.id()))]
    pub async fn react_for_target(
        &self,
        instance: EntityRef,
        kind: EventKind,
        target: &EntityType,
    ) -> Result<ReactionReport> {
        self.run(instance, kind, Some(target)).await
    }

    async fn run(
        &self,
        instance: EntityRef,
        kind: EventKind,
        target: Option<&EntityType>,
    ) -> Result<ReactionReport> {
        let registry = self.registry().await;
        let source_type = instance.entity_type();
        let mut report = ReactionReport::default();

        let rules = registry
            .rules_for(&source_type)
            .iter()
            .filter(|rule| target.map_or(true, |t| rule.target_type == *t));

        for rule in rules {
            self.fire(rule, instance.clone(), kind, &mut report).await?;
        }

        let own_target = target.map_or(true, |t| *t == source_type);
        if kind == EventKind::Deleted && own_target && registry.is_target(&source_type) {
            let evicted = self.store.delete_all(&source_type, instance.id()).await?;
            if evicted > 0 {
                debug!("删除实例时清除了 {} 个剩余条目", evicted);
            }
            report.entries_evicted += evicted;
        }

        debug!(
            "事件处理完成: kind={}, fired={}, skipped={}, written={}, evicted={}, failures={}",
            kind,
            report.rules_fired,
            report.rules_skipped,
            report.entries_written,
            report.entries_evicted,
            report.failures.len()
        );
        Ok(report)
    }

    /// 单独执行一条规则，不需要在注册表中安装
    ///
    /// 用解析器找出受影响的实例后对规则中的属性执行重新计算或清除。
    /// 与 [`react`](Self::react) 相同，解析和重新计算的失败记录在报告中，存储层错误直接返回
    #[instrument(skip(self, rule, instance), level = "debug", fields(resolver = rule.resolver.name(), entity_id = instance.id()))]
    pub async fn apply_rule(
        &self,
        rule: &DependencyRule,
        instance: EntityRef,
        kind: EventKind,
    ) -> Result<ReactionReport> {
        let mut report = ReactionReport::default();
        self.fire(rule, instance, kind, &mut report).await?;
        Ok(report)
    }

    async fn fire(
        &self,
        rule: &DependencyRule,
        instance: EntityRef,
        kind: EventKind,
        report: &mut ReactionReport,
    ) -> Result<()> {
        let resolved = match rule
            .resolver
            .resolve(instance, self.entities.clone())
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                let failure = CacheError::Resolution {
                    source_type: rule.source_type.to_string(),
                    target_type: rule.target_type.to_string(),
                    message: e.to_string(),
                };
                warn!("{}", failure);
                report.failures.push(failure);
                report.rules_skipped += 1;
                return Ok(());
            }
        };

        if resolved.is_empty() {
            debug!(
                "解析器 {} 未找到受影响的 {} 实例，跳过",
                rule.resolver.name(),
                rule.target_type
            );
            report.rules_skipped += 1;
            return Ok(());
        }

        report.rules_fired += 1;
        for affected in resolved {
            if affected.entity_type() != rule.target_type {
                let failure = CacheError::Resolution {
                    source_type: rule.source_type.to_string(),
                    target_type: rule.target_type.to_string(),
                    message: format!(
                        "resolver '{}' returned a {} instance",
                        rule.resolver.name(),
                        affected.entity_type()
                    ),
                };
                warn!("{}", failure);
                report.failures.push(failure);
                continue;
            }
            self.apply(rule, affected, kind, report).await?;
        }
        Ok(())
    }

    /// 对单个目标实例应用规则
    async fn apply(
        &self,
        rule: &DependencyRule,
        affected: EntityRef,
        kind: EventKind,
        report: &mut ReactionReport,
    ) -> Result<()> {
        let entity_id = affected.id();

        if kind == EventKind::Deleted {
            for property in &rule.properties {
                if self
                    .store
                    .delete(&rule.target_type, entity_id, property)
                    .await?
                {
                    report.entries_evicted += 1;
                }
            }
            return Ok(());
        }

        for property in &rule.properties {
            let computed = match affected.property(property) {
                Some(accessor) => accessor
                    .resolve(self.entities.clone())
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("no accessor with this name".to_string()),
            };

            let value = match computed {
                Ok(value) => value,
                Err(message) => {
                    let failure = CacheError::Recompute {
                        entity_type: rule.target_type.to_string(),
                        entity_id,
                        property: property.clone(),
                        message,
                    };
                    warn!("{}", failure);
                    report.failures.push(failure);
                    // 同一实例在本规则下的剩余属性不再计算
                    break;
                }
            };

            let bytes = self.serializer.encode(&value)?;
            self.store
                .upsert(&rule.target_type, entity_id, property, bytes)
                .await?;
            report.entries_written += 1;
        }
        Ok(())
    }
}

/// 某个 (源类型, 目标类型) 组合的事件订阅
///
/// 只持有引擎的弱引用，引擎释放后订阅不再生效
pub struct RuleSubscription {
    engine: Weak<InvalidationEngine>,
    target: EntityType,
}

impl RuleSubscription {
    pub fn new(engine: &Arc<InvalidationEngine>, target: EntityType) -> Self {
        Self {
            engine: Arc::downgrade(engine),
            target,
        }
    }
}

#[async_trait]
impl EventHandler for RuleSubscription {
    async fn handle(&self, instance: EntityRef, kind: EventKind) -> Result<()> {
        let Some(engine) = self.engine.upgrade() else {
            debug!("失效引擎已释放，忽略 {} 事件", kind);
            return Ok(());
        };
        engine
            .react_for_target(instance, kind, &self.target)
            .await?
            .into_result()
            .map(|_| ())
    }
}
