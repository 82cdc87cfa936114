//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了依赖规则和依赖注册表。
//!
//! 注册表由启动注册构建，构建完成后只读；重新启动注册会构建新的注册表
//! 并整体替换旧的注册表。

use crate::entity::EntityType;
use crate::resolver::{IdentityResolver, Resolver};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 本库拥有的事件订阅标识前缀
pub const SUBSCRIPTION_PREFIX: &str = "propscache_";

/// `Saved` 事件订阅标识
pub fn saved_subscription_key(source: &EntityType, target: &EntityType) -> String {
    format!("{}{}_{}", SUBSCRIPTION_PREFIX, source, target)
}

/// `Deleted` 事件订阅标识
pub fn deleted_subscription_key(source: &EntityType, target: &EntityType) -> String {
    format!("{}del_{}_{}", SUBSCRIPTION_PREFIX, source, target)
}

/// 依赖规则
///
/// 源类型的实例发生变化时，通过解析器找到受影响的目标实例，
/// 并维护这些实例上的 `properties`
#[derive(Clone)]
pub struct DependencyRule {
    pub target_type: EntityType,
    pub source_type: EntityType,
    pub resolver: Arc<dyn Resolver>,
    pub properties: Vec<String>,
}

impl DependencyRule {
    pub fn new(
        target_type: EntityType,
        source_type: EntityType,
        resolver: Arc<dyn Resolver>,
        properties: Vec<String>,
    ) -> Self {
        Self {
            target_type,
            source_type,
            resolver,
            properties,
        }
    }

    /// 自身规则：实例自身变化时维护其全部缓存属性
    pub fn self_rule(entity_type: EntityType, properties: Vec<String>) -> Self {
        let resolver: Arc<dyn Resolver> = Arc::new(IdentityResolver::new(entity_type.clone()));
        Self::new(entity_type.clone(), entity_type, resolver, properties)
    }

    pub fn is_self_rule(&self) -> bool {
        self.source_type == self.target_type
    }
}

impl fmt::Debug for DependencyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyRule")
            .field("target_type", &self.target_type)
            .field("source_type", &self.source_type)
            .field("resolver", &self.resolver.name())
            .field("properties", &self.properties)
            .finish()
    }
}

/// 已安装规则的记录，仅用于查看
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledRule {
    pub target_type: EntityType,
    pub source_type: EntityType,
    pub properties: Vec<String>,
}

/// 依赖注册表
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    /// 源类型 -> 规则，按安装顺序
    rules: HashMap<EntityType, Vec<DependencyRule>>,
    /// 目标类型 -> 缓存属性
    cached_properties: HashMap<EntityType, Vec<String>>,
    ledger: Vec<InstalledRule>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记目标类型的缓存属性
    pub fn register_target(&mut self, entity_type: EntityType, properties: Vec<String>) {
        self.cached_properties.insert(entity_type, properties);
    }

    /// 安装一条规则并记入账本
    pub fn install(&mut self, rule: DependencyRule) {
        self.ledger.push(InstalledRule {
            target_type: rule.target_type.clone(),
            source_type: rule.source_type.clone(),
            properties: rule.properties.clone(),
        });
        self.rules
            .entry(rule.source_type.clone())
            .or_default()
            .push(rule);
    }

    /// 源类型下的规则，按触发顺序
    pub fn rules_for(&self, source_type: &EntityType) -> &[DependencyRule] {
        self.rules
            .get(source_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 目标类型声明的缓存属性
    pub fn cached_properties(&self, entity_type: &EntityType) -> Option<&[String]> {
        self.cached_properties.get(entity_type).map(Vec::as_slice)
    }

    pub fn is_target(&self, entity_type: &EntityType) -> bool {
        self.cached_properties.contains_key(entity_type)
    }

    /// 全部目标类型
    pub fn targets(&self) -> impl Iterator<Item = &EntityType> {
        self.cached_properties.keys()
    }

    pub fn installed_rules(&self) -> &[InstalledRule] {
        &self.ledger
    }

    /// 去重后的 (源类型, 目标类型) 组合，按首次安装顺序
    pub fn pairs(&self) -> Vec<(EntityType, EntityType)> {
        let mut pairs: Vec<(EntityType, EntityType)> = Vec::new();
        for entry in &self.ledger {
            let pair = (entry.source_type.clone(), entry.target_type.clone());
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}
