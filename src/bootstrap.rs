//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了启动注册：扫描实体类型的缓存声明，构建依赖注册表并接入事件订阅。
//!
//! 启动注册可以重复执行。每次执行都会构建全新的注册表，
//! 订阅以确定性的标识替换，不会叠加。

use crate::declaration::ModelDescriptor;
use crate::engine::{InvalidationEngine, RuleSubscription};
use crate::entity::EntityType;
use crate::error::{CacheError, Result};
use crate::events::{EventDispatcher, EventHandler, EventKind, Subscription};
use crate::registry::{
    deleted_subscription_key, saved_subscription_key, DependencyRegistry, SUBSCRIPTION_PREFIX,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 启动注册结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// 安装的规则数（含自身规则）
    pub installed: usize,
    /// 没有声明或没有缓存属性而被跳过的类型
    pub skipped: Vec<EntityType>,
    /// 建立的事件订阅数
    pub subscriptions: usize,
}

/// 执行启动注册
///
/// 每个声明先整体校验再安装，被拒绝的声明不会留下任何规则或订阅，
/// 其余合法声明照常生效。存在被拒绝的声明时返回 [`CacheError::Bootstrap`]
#[instrument(skip_all, level = "info", fields(models = models.len()))]
pub async fn bootstrap(
    engine: &Arc<InvalidationEngine>,
    dispatcher: &EventDispatcher,
    models: &[ModelDescriptor],
) -> Result<BootstrapReport> {
    let mut registry = DependencyRegistry::new();
    let mut report = BootstrapReport::default();
    let mut rejected = Vec::new();
    let mut seen = HashSet::new();

    for model in models {
        let entity_type = &model.entity_type;
        let declaration = match &model.declaration {
            Some(declaration) if !declaration.cached_properties.is_empty() => declaration,
            Some(declaration) if !declaration.resolvers.is_empty() => {
                // 没有缓存属性的解析器永远不会生效，元数据错误同样需要报告
                let e = declaration.build_rules(entity_type).err().unwrap_or_else(|| {
                    CacheError::Declaration {
                        entity_type: entity_type.to_string(),
                        reason: "declares resolvers but no cached properties".to_string(),
                    }
                });
                warn!("拒绝缓存声明: {}", e);
                rejected.push(e);
                continue;
            }
            _ => {
                debug!("{} 没有缓存声明，跳过", entity_type);
                report.skipped.push(entity_type.clone());
                continue;
            }
        };

        if !seen.insert(entity_type.clone()) {
            rejected.push(CacheError::Declaration {
                entity_type: entity_type.to_string(),
                reason: "declared more than once".to_string(),
            });
            continue;
        }

        match declaration.build_rules(entity_type) {
            Ok(rules) => {
                registry.register_target(entity_type.clone(), declaration.cached_properties.clone());
                for rule in rules {
                    debug!(
                        "安装规则: {} -> {} {:?}",
                        rule.source_type, rule.target_type, rule.properties
                    );
                    registry.install(rule);
                    report.installed += 1;
                }
            }
            Err(e) => {
                warn!("拒绝缓存声明: {}", e);
                rejected.push(e);
            }
        }
    }

    let mut subscriptions = Vec::new();
    for (source, target) in registry.pairs() {
        let handler: Arc<dyn EventHandler> =
            Arc::new(RuleSubscription::new(engine, target.clone()));
        subscriptions.push(Subscription {
            sender: source.clone(),
            kind: EventKind::Saved,
            dispatch_uid: saved_subscription_key(&source, &target),
            handler: handler.clone(),
        });
        subscriptions.push(Subscription {
            sender: source.clone(),
            kind: EventKind::Deleted,
            dispatch_uid: deleted_subscription_key(&source, &target),
            handler,
        });
    }

    // 注册表在订阅表的写锁内替换，事件不会看到新旧两者混用的状态
    let registry = Arc::new(registry);
    report.subscriptions = dispatcher
        .replace_owned_with(SUBSCRIPTION_PREFIX, subscriptions, || async move {
            engine.swap_registry(registry).await;
        })
        .await;

    info!(
        "属性缓存启动注册完成: rules={}, subscriptions={}, skipped={}, rejected={}",
        report.installed,
        report.subscriptions,
        report.skipped.len(),
        rejected.len()
    );

    if rejected.is_empty() {
        Ok(report)
    } else {
        Err(CacheError::Bootstrap(rejected))
    }
}
