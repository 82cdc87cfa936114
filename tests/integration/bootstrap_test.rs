//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 启动注册集成测试

#[path = "../common/mod.rs"]
mod common;

use async_trait::async_trait;
use common::{models, Fixture, Root, LEAF, MID, ROOT};
use oxprops::events::{EventHandler, Subscription};
use oxprops::{
    resolver_fn, CacheDeclaration, CacheError, EntityRef, EventKind, InstalledRule,
    ModelDescriptor, ResolverDescriptor,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// 测试账本按安装顺序记录规则，自身规则在前
#[tokio::test]
async fn test_installed_rules_ledger() {
    let fx = Fixture::new().await;
    let rules = fx.cache.installed_rules().await;

    assert_eq!(
        rules,
        vec![
            InstalledRule {
                target_type: MID,
                source_type: MID,
                properties: strings(&["path"]),
            },
            InstalledRule {
                target_type: MID,
                source_type: ROOT,
                properties: strings(&["path"]),
            },
            InstalledRule {
                target_type: LEAF,
                source_type: LEAF,
                properties: strings(&["path", "label"]),
            },
            InstalledRule {
                target_type: LEAF,
                source_type: ROOT,
                properties: strings(&["path"]),
            },
            InstalledRule {
                target_type: LEAF,
                source_type: MID,
                properties: strings(&["path"]),
            },
        ]
    );
    assert!(fx.cache.cached_properties(&ROOT).await.is_none());
    assert_eq!(
        fx.cache.cached_properties(&LEAF).await,
        Some(strings(&["path", "label"]))
    );
}

/// 测试重复启动注册不会叠加订阅或账本条目
#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let fx = Fixture::new().await;
    let dispatcher = fx.cache.dispatcher().clone();
    let before = dispatcher.receivers(&ROOT, EventKind::Saved).await;

    for _ in 0..3 {
        let report = fx.cache.bootstrap(&models()).await.unwrap();
        assert_eq!(report.installed, 5);
        assert_eq!(report.subscriptions, 10);
        assert_eq!(report.skipped, vec![ROOT]);
    }

    assert_eq!(dispatcher.receivers(&ROOT, EventKind::Saved).await, before);
    assert_eq!(
        dispatcher.receivers(&ROOT, EventKind::Deleted).await,
        vec!["propscache_del_pc_root_pc_mid", "propscache_del_pc_root_pc_leaf"]
    );
    assert_eq!(fx.cache.installed_rules().await.len(), 5);

    let (root, _mid, leaf) = fx.chain().await;
    fx.save(Root {
        id: root.id,
        name: "x".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("x/b/c")));
}

/// 测试缺少元数据的声明被拒绝，其余声明照常生效
#[tokio::test]
async fn test_missing_metadata_rejects_only_that_declaration() {
    let fx = Fixture::new().await;

    let mut declared = models();
    declared[1] = ModelDescriptor::new(MID).with_declaration(
        CacheDeclaration::new(["path"]).resolver(ResolverDescriptor::new(resolver_fn(
            "mids_without_model",
            |_root, _entities| async move { Ok::<_, CacheError>(Vec::new()) },
        ))
        .properties(["path"])),
    );

    let err = fx.cache.bootstrap(&declared).await.unwrap_err();
    match err {
        CacheError::Bootstrap(rejected) => {
            assert_eq!(rejected.len(), 1);
            assert!(matches!(
                &rejected[0],
                CacheError::Declaration { entity_type, .. } if entity_type == "pc_mid"
            ));
        }
        other => panic!("unexpected error: {}", other),
    }

    // Mid 不再有任何规则或订阅，Leaf 不受影响
    let dispatcher = fx.cache.dispatcher();
    assert_eq!(
        dispatcher.receivers(&MID, EventKind::Saved).await,
        vec!["propscache_pc_mid_pc_leaf"]
    );
    assert!(fx.cache.cached_properties(&MID).await.is_none());

    let (_root, mid, leaf) = fx.chain().await;
    assert_eq!(fx.cached(&MID, mid.id, "path").await, None);
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/b/c")));
}

/// 测试没有声明或没有缓存属性的类型被跳过
#[tokio::test]
async fn test_types_without_declaration_are_skipped() {
    let fx = Fixture::new().await;
    let report = fx
        .cache
        .bootstrap(&[
            ModelDescriptor::new(ROOT),
            ModelDescriptor::new(MID).with_declaration(CacheDeclaration::new(Vec::<String>::new())),
        ])
        .await
        .unwrap();

    assert_eq!(report.installed, 0);
    assert_eq!(report.subscriptions, 0);
    assert_eq!(report.skipped, vec![ROOT, MID]);
    assert!(fx.cache.installed_rules().await.is_empty());
    assert!(fx.cache.dispatcher().receivers(&LEAF, EventKind::Saved).await.is_empty());
}

struct Audit(Arc<AtomicUsize>);

#[async_trait]
impl EventHandler for Audit {
    async fn handle(&self, _instance: EntityRef, _kind: EventKind) -> oxprops::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 测试重新启动注册只替换本库的订阅
#[tokio::test]
async fn test_rebootstrap_keeps_foreign_subscriptions() {
    let fx = Fixture::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    fx.cache
        .dispatcher()
        .connect(Subscription {
            sender: ROOT,
            kind: EventKind::Saved,
            dispatch_uid: "audit_root".to_string(),
            handler: Arc::new(Audit(calls.clone())),
        })
        .await;

    // 只保留 Leaf 的声明
    let leaf_only: Vec<ModelDescriptor> = models().into_iter().skip(2).collect();
    fx.cache.bootstrap(&leaf_only).await.unwrap();

    assert_eq!(
        fx.cache.dispatcher().receivers(&ROOT, EventKind::Saved).await,
        vec!["audit_root", "propscache_pc_root_pc_leaf"]
    );

    let root = fx.root("a").await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mid = fx.mid("b", &root).await;
    assert_eq!(fx.cached(&MID, mid.id, "path").await, None);
}
