//! oxprops - 实体派生属性缓存库
//!
//! 缓存实体上计算代价较高的属性值，并在相关实体发生变化时
//! 根据声明的依赖关系自动重新计算或清除，读取时可一次批量加载。

#![doc(html_root_url = "https://docs.rs/oxprops/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod declaration;
pub mod engine;
pub mod entity;
pub mod error;
pub mod events;
pub mod hydration;
pub mod manager;
pub mod registry;
pub mod resolver;
pub mod serialization;
pub mod store;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use bootstrap::BootstrapReport;
pub use config::Config;
pub use declaration::{CacheDeclaration, ModelDescriptor, ResolverDescriptor};
pub use engine::{InvalidationEngine, ReactionReport};
pub use entity::{
    downcast, Entity, EntityId, EntityRef, EntityStore, EntityType, MemoryEntityStore,
    PropertyAccessor, PropertyValue,
};
pub use error::{CacheError, Result};
pub use events::{EventDispatcher, EventKind};
pub use hydration::{CachedProperties, Hydrated};
pub use manager::PropertyCache;
pub use registry::{DependencyRule, InstalledRule};
pub use resolver::{resolver_fn, Resolver};
pub use store::{CacheStore, MemoryCacheStore, SqlCacheStore};

/// oxprops 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
