//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了属性缓存的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use crate::serialization::{JsonSerializer, SerializerEnum};
use lazy_static::lazy_static;
use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// SQL 标识符允许的最大长度
const MAX_IDENTIFIER_LENGTH: usize = 63;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// 全局配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 序列化类型
    pub serialization: SerializationType,
    /// 是否压缩属性值
    pub compress_values: bool,
    /// 默认日志过滤级别，RUST_LOG 优先
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            serialization: SerializationType::Json,
            compress_values: false,
            log_level: "info".to_string(),
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
}

/// 缓存存储后端
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储，进程退出后丢失
    #[default]
    Memory,
    /// 关系数据库（SQLite / PostgreSQL / MySQL）
    Database,
}

/// 缓存存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// 数据库连接字符串
    pub connection_string: Option<SecretString>,
    /// 连接池最大连接数
    pub max_connections: u32,
    /// 连接超时时间（毫秒）
    pub connect_timeout_ms: u64,
    /// 缓存表名
    pub table_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            connection_string: None,
            max_connections: 5,
            connect_timeout_ms: 5000,
            table_name: "property_cache".to_string(),
        }
    }
}

impl Config {
    /// 从 TOML 文本解析配置
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 按配置创建序列化器
    pub fn serializer(&self) -> SerializerEnum {
        match self.global.serialization {
            SerializationType::Json if self.global.compress_values => {
                SerializerEnum::Json(JsonSerializer::with_compression())
            }
            SerializationType::Json => SerializerEnum::Json(JsonSerializer::new()),
        }
    }

    /// 验证配置
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.log_level.trim().is_empty() {
            return Err("global.log_level cannot be empty".to_string());
        }

        let store = &self.store;
        validate_identifier(&store.table_name)?;

        if store.backend == StoreBackend::Database {
            if store.connection_string.is_none() {
                return Err(
                    "store.connection_string is required for the database backend".to_string(),
                );
            }

            if !(1..=100).contains(&store.max_connections) {
                return Err("store.max_connections must be between 1 and 100".to_string());
            }

            if !(100..=60000).contains(&store.connect_timeout_ms) {
                return Err("store.connect_timeout_ms must be between 100 and 60000 ms".to_string());
            }
        }

        Ok(())
    }
}

/// 验证SQL标识符是否安全（防止SQL注入）
pub fn validate_identifier(identifier: &str) -> std::result::Result<(), String> {
    if identifier.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(format!(
            "Identifier '{}' exceeds maximum length of {} characters",
            identifier, MAX_IDENTIFIER_LENGTH
        ));
    }

    if !IDENTIFIER.is_match(identifier) {
        return Err(format!(
            "Invalid identifier '{}': only letters, digits and underscores are allowed, and it must not start with a digit",
            identifier
        ));
    }

    Ok(())
}
