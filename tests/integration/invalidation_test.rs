//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存失效集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{Fixture, Leaf, Mid, Root, LEAF, MID, ROOT};
use oxprops::{CacheStore, EntityStore, EventKind, MemoryCacheStore};
use serde_json::json;
use std::sync::Arc;

/// 测试三层结构的完整场景
///
/// 创建 a/b/c，修改根节点名称后叶子的 path 随之更新，删除叶子后条目消失
#[tokio::test]
async fn test_root_mid_leaf_scenario() {
    let fx = Fixture::new().await;
    let (root, _mid, leaf) = fx.chain().await;

    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/b/c")));

    fx.save(Root {
        id: root.id,
        name: "x".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("x/b/c")));

    assert!(fx.entities.delete(&LEAF, leaf.id).await.unwrap());
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, None);
    assert_eq!(fx.cached(&LEAF, leaf.id, "label").await, None);
}

/// 测试自身规则：实例保存后所有声明的属性都与当前值一致
#[tokio::test]
async fn test_self_rule_convergence() {
    let fx = Fixture::new().await;
    let (_root, mid, leaf) = fx.chain().await;

    assert_eq!(fx.cached(&MID, mid.id, "path").await, Some(json!("a/b")));
    assert_eq!(fx.cached(&LEAF, leaf.id, "label").await, Some(json!("leaf:c")));

    fx.save(Leaf {
        name: "d".to_string(),
        ..leaf.clone()
    })
    .await
    .unwrap();
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/b/d")));
    assert_eq!(fx.cached(&LEAF, leaf.id, "label").await, Some(json!("leaf:d")));
}

/// 测试中间层变化只通过 Mid -> Leaf 规则传播
#[tokio::test]
async fn test_cascade_from_mid() {
    let fx = Fixture::new().await;
    let (root, mid, leaf) = fx.chain().await;
    let other_mid = fx.mid("q", &root).await;
    let other_leaf = fx.leaf("r", &other_mid).await;

    fx.save(Mid {
        name: "B".to_string(),
        ..mid.clone()
    })
    .await
    .unwrap();

    assert_eq!(fx.cached(&MID, mid.id, "path").await, Some(json!("a/B")));
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/B/c")));
    assert_eq!(fx.cached(&LEAF, other_leaf.id, "path").await, Some(json!("a/q/r")));
}

/// 测试删除事件只清除规则维护的属性
#[tokio::test]
async fn test_delete_eviction_keeps_other_properties() {
    let fx = Fixture::new().await;
    let (root, mid, leaf) = fx.chain().await;

    assert!(fx.entities.delete(&ROOT, root.id).await.unwrap());

    // Root -> Leaf 规则只维护 path
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, None);
    assert_eq!(fx.cached(&LEAF, leaf.id, "label").await, Some(json!("leaf:c")));
    assert_eq!(fx.cached(&MID, mid.id, "path").await, None);
}

/// 测试解析为空时不产生任何写入
#[tokio::test]
async fn test_empty_resolution_is_noop() {
    let store = Arc::new(MemoryCacheStore::new());
    let fx = Fixture::with_store(store.clone()).await;

    let lonely = fx.root("lonely").await;
    assert!(store.is_empty());

    let report = fx
        .cache
        .react(Arc::new(lonely.clone()), EventKind::Saved)
        .await
        .unwrap();
    assert_eq!(report.rules_fired, 0);
    assert_eq!(report.rules_skipped, 2);
    assert_eq!(report.entries_written, 0);

    let report = fx
        .cache
        .react(Arc::new(lonely), EventKind::Deleted)
        .await
        .unwrap();
    assert_eq!(report.entries_evicted, 0);
    assert!(store.is_empty());
}

/// 测试重复投递同一 Saved 事件的结果与投递一次相同
#[tokio::test]
async fn test_repeated_saved_event_is_idempotent() {
    let store = Arc::new(MemoryCacheStore::new());
    let fx = Fixture::with_store(store.clone()).await;
    let (root, _mid, leaf) = fx.chain().await;

    let before = store.len();
    for _ in 0..3 {
        let report = fx
            .cache
            .react(Arc::new(root.clone()), EventKind::Saved)
            .await
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.rules_fired, 2);
    }

    assert_eq!(store.len(), before);
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/b/c")));
}

/// 测试条目以目标实例的标识为键，而不是源实例的标识
#[tokio::test]
async fn test_entries_are_keyed_by_target_id() {
    let fx = Fixture::new().await;
    let root = fx.root("a").await;
    let other_root = fx.root("z").await;
    let mid = fx.mid("b", &root).await;
    let other_mid = fx.mid("y", &other_root).await;
    let first = fx.leaf("filler", &other_mid).await;
    let _ = fx.leaf("filler2", &other_mid).await;
    let leaf = fx.leaf("c", &mid).await;
    assert_eq!(first.id, root.id);
    assert_ne!(leaf.id, root.id);

    fx.cache.store().clear().await.unwrap();
    let report = fx
        .cache
        .react(Arc::new(root.clone()), EventKind::Saved)
        .await
        .unwrap();
    assert_eq!(report.rules_fired, 2);

    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/b/c")));
    assert_eq!(fx.cached(&LEAF, root.id, "path").await, None);
    assert_eq!(fx.cached(&MID, mid.id, "path").await, Some(json!("a/b")));
}

/// 测试删除目标实例时也会清除声明之外的剩余条目
#[tokio::test]
async fn test_delete_clears_undeclared_entries() {
    let fx = Fixture::new().await;
    let (_root, _mid, leaf) = fx.chain().await;
    fx.cache
        .store()
        .upsert(&LEAF, leaf.id, "legacy", b"\"old\"".to_vec())
        .await
        .unwrap();

    assert!(fx.entities.delete(&LEAF, leaf.id).await.unwrap());
    assert_eq!(fx.cached(&LEAF, leaf.id, "legacy").await, None);
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, None);
}

/// 测试实体已移除后重放 Deleted 事件仍会清除它的条目
///
/// 自身规则此时解析为空，条目由按实例整体清除的步骤移除
#[tokio::test]
async fn test_replayed_delete_after_removal() {
    let store = Arc::new(MemoryCacheStore::new());
    let fx = Fixture::with_store(store.clone()).await;
    let (_root, _mid, leaf) = fx.chain().await;
    assert!(fx.entities.delete(&LEAF, leaf.id).await.unwrap());

    // 模拟删除之后残留的条目
    store
        .upsert(&LEAF, leaf.id, "path", b"\"a/b/c\"".to_vec())
        .await
        .unwrap();
    store
        .upsert(&LEAF, leaf.id, "legacy", b"\"old\"".to_vec())
        .await
        .unwrap();

    let report = fx
        .cache
        .react(Arc::new(leaf.clone()), EventKind::Deleted)
        .await
        .unwrap();
    assert_eq!(report.rules_fired, 0);
    assert_eq!(report.rules_skipped, 1);
    assert_eq!(report.entries_evicted, 2);
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, None);
    assert_eq!(fx.cached(&LEAF, leaf.id, "legacy").await, None);
}

/// 测试并发的 Saved 事件不会产生重复条目
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saved_events() {
    let store = Arc::new(MemoryCacheStore::new());
    let fx = Arc::new(Fixture::with_store(store.clone()).await);
    let root = fx.root("a").await;
    let mid = fx.mid("b", &root).await;
    let mut leaves = Vec::new();
    for i in 0..16 {
        leaves.push(fx.leaf(&format!("n{}", i), &mid).await);
    }
    let before = store.len();

    let mut handles = Vec::new();
    for leaf in leaves.clone() {
        let fx = fx.clone();
        handles.push(tokio::spawn(async move { fx.save(leaf).await }));
    }
    for _ in 0..4 {
        let fx = fx.clone();
        let root = root.clone();
        handles.push(tokio::spawn(async move {
            fx.cache
                .react(Arc::new(root), EventKind::Saved)
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 1 个 Mid path，每个 Leaf 的 path 与 label
    assert_eq!(before, 1 + 2 * leaves.len());
    assert_eq!(store.len(), before);
    for leaf in &leaves {
        assert_eq!(
            fx.cached(&LEAF, leaf.id, "path").await,
            Some(json!(format!("a/b/{}", leaf.name)))
        );
    }
}
