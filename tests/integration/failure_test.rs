//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 失败处理集成测试：解析失败、重新计算失败与存储失败

#[path = "../common/mod.rs"]
mod common;

use async_trait::async_trait;
use common::{models, Fixture, Leaf, Root, LEAF, MID, ROOT};
use oxprops::store::{CacheEntry, CacheStore, MemoryCacheStore, TypeStats};
use oxprops::{
    resolver_fn, CacheDeclaration, CacheError, EntityId, EntityStore, EntityType, EventKind,
    ModelDescriptor, ResolverDescriptor, Result,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 写操作可以被切换为失败的存储
#[derive(Default)]
struct FlakyStore {
    inner: MemoryCacheStore,
    broken: AtomicBool,
}

impl FlakyStore {
    fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(CacheError::Store("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.inner.get(entity_type, entity_id, name).await
    }

    async fn get_many(&self, entity_type: &EntityType, ids: &[EntityId]) -> Result<Vec<CacheEntry>> {
        self.inner.get_many(entity_type, ids).await
    }

    async fn upsert(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        self.check()?;
        self.inner.upsert(entity_type, entity_id, name, value).await
    }

    async fn delete(&self, entity_type: &EntityType, entity_id: EntityId, name: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete(entity_type, entity_id, name).await
    }

    async fn delete_all(&self, entity_type: &EntityType, entity_id: EntityId) -> Result<u64> {
        self.check()?;
        self.inner.delete_all(entity_type, entity_id).await
    }

    async fn stats(&self) -> Result<Vec<TypeStats>> {
        self.inner.stats().await
    }

    async fn clear(&self) -> Result<u64> {
        self.inner.clear().await
    }
}

/// 测试访问器失败时只跳过该实例剩余的属性，旧值保持不变
#[tokio::test]
async fn test_recompute_failure_keeps_previous_value() {
    let fx = Fixture::new().await;
    let (_root, _mid, leaf) = fx.chain().await;

    // 指向不存在的 Mid，path 无法计算
    let err = fx
        .save(Leaf {
            name: "orphan".to_string(),
            mid_id: 404,
            ..leaf.clone()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Recompute { ref property, .. } if property == "path"));

    // path 失败后 label 不再计算，两者都保留旧值
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/b/c")));
    assert_eq!(fx.cached(&LEAF, leaf.id, "label").await, Some(json!("leaf:c")));
}

/// 测试解析器失败不影响同一事件的其他规则
#[tokio::test]
async fn test_resolution_failure_does_not_block_other_rules() {
    let fx = Fixture::new().await;
    let (root, mid, leaf) = fx.chain().await;

    let mut declared = models();
    declared[2] = ModelDescriptor::new(LEAF).with_declaration(
        CacheDeclaration::new(["path", "label"]).resolver(
            ResolverDescriptor::new(resolver_fn("always_fails", |_root, _entities| async move {
                Err::<Vec<oxprops::EntityRef>, _>(CacheError::Entity("index offline".to_string()))
            }))
            .model(ROOT)
            .properties(["path"]),
        ),
    );
    fx.cache.bootstrap(&declared).await.unwrap();

    let err = fx
        .save(Root {
            id: root.id,
            name: "x".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Resolution { ref source_type, .. } if source_type == "pc_root"));

    // Root -> Mid 规则照常执行，Root -> Leaf 规则被跳过
    assert_eq!(fx.cached(&MID, mid.id, "path").await, Some(json!("x/b")));
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/b/c")));

    let report = fx
        .cache
        .react(
            Arc::new(Root {
                id: root.id,
                name: "x".to_string(),
            }),
            EventKind::Saved,
        )
        .await
        .unwrap();
    assert_eq!(report.rules_fired, 1);
    assert_eq!(report.rules_skipped, 1);
    assert_eq!(report.failures.len(), 1);
}

/// 测试存储失败立即中止并返回给调用方
#[tokio::test]
async fn test_store_failure_propagates() {
    let store = Arc::new(FlakyStore::default());
    let fx = Fixture::with_store(store.clone()).await;
    let (root, _mid, leaf) = fx.chain().await;

    store.set_broken(true);
    let err = fx
        .cache
        .react(Arc::new(root.clone()), EventKind::Saved)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Store(_)));
    assert!(err.is_store_failure());

    let err = fx
        .save(Root {
            id: root.id,
            name: "x".to_string(),
        })
        .await
        .unwrap_err();
    // 两条 Root 规则各自报告了存储失败
    assert!(matches!(
        err,
        CacheError::Invalidation(ref inner) if inner.len() == 2 && inner.iter().all(|e| e.is_store_failure())
    ));

    store.set_broken(false);
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, Some(json!("a/b/c")));
}

/// 测试 Deleted 事件处理失败时实体不会被删除
#[tokio::test]
async fn test_failed_delete_keeps_entity() {
    let store = Arc::new(FlakyStore::default());
    let fx = Fixture::with_store(store.clone()).await;
    let (_root, _mid, leaf) = fx.chain().await;

    store.set_broken(true);
    assert!(fx.entities.delete(&LEAF, leaf.id).await.is_err());
    assert!(fx.entities.fetch_one(&LEAF, leaf.id).await.unwrap().is_some());

    store.set_broken(false);
    assert!(fx.entities.delete(&LEAF, leaf.id).await.unwrap());
    assert_eq!(fx.cached(&LEAF, leaf.id, "path").await, None);
}
