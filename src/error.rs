//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了属性缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 属性缓存错误类型枚举
///
/// 定义了声明注册、失效处理、缓存存储中可能发生的各种错误
#[derive(Error, Debug)]
pub enum CacheError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 单个实体类型的缓存声明无效（缺少 model 或 properties 等）
    #[error("Invalid cache declaration for {entity_type}: {reason}")]
    Declaration { entity_type: String, reason: String },

    /// 启动注册时被拒绝的声明集合（其余合法声明已完成注册）
    #[error("Bootstrap rejected {} declaration(s): {}", .0.len(), join_errors(.0))]
    Bootstrap(Vec<CacheError>),

    /// 解析受影响实例失败
    #[error("Resolution failed for rule {source_type} -> {target_type}: {message}")]
    Resolution {
        source_type: String,
        target_type: String,
        message: String,
    },

    /// 重新计算属性值失败
    #[error("Recompute failed for {entity_type}#{entity_id}.{property}: {message}")]
    Recompute {
        entity_type: String,
        entity_id: u64,
        property: String,
        message: String,
    },

    /// 一次事件处理中记录的全部失败
    #[error("Invalidation finished with {} failure(s): {}", .0.len(), join_errors(.0))]
    Invalidation(Vec<CacheError>),

    /// 实体类型未注册缓存属性
    #[error("Entity type not registered: {0}")]
    NotRegistered(String),

    /// 实体层（访问器、解析器、实体存储）报告的错误
    #[error("Entity error: {0}")]
    Entity(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 缓存存储错误
    #[error("Store error: {0}")]
    Store(String),

    /// 数据库连接错误
    #[error("Database connection error: {0}")]
    DatabaseError(String),

    /// Sea-ORM数据库错误
    #[error("Sea-ORM error: {0}")]
    SeaOrmError(#[from] sea_orm::DbErr),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML 解析错误
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl CacheError {
    /// 是否为存储层错误
    ///
    /// 存储层错误会立即中止当前事件的处理并传播给调用方
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            CacheError::Store(_)
                | CacheError::DatabaseError(_)
                | CacheError::SeaOrmError(_)
                | CacheError::Serialization(_)
                | CacheError::IoError(_)
        )
    }
}

fn join_errors(errors: &[CacheError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
