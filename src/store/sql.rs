//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 Sea-ORM 的缓存存储，支持 SQLite、PostgreSQL 和 MySQL。
//!
//! 唯一性由表上的 `UNIQUE (entity_type, entity_id, name)` 约束保证，
//! upsert 是单条 `INSERT ... ON CONFLICT` 语句，并发写入同一键时后写者生效。

use super::{CacheEntry, CacheStore, TypeStats};
use crate::config::{validate_identifier, StoreConfig};
use crate::entity::{EntityId, EntityType};
use crate::error::{CacheError, Result};
use crate::utils::redaction::redact_connection_string;
use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, Value,
};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 单条 IN 查询携带的最大标识数量
const MAX_IDS_PER_QUERY: usize = 500;

/// 内存数据库连接的存活时间，连接被回收时表会随之消失
const PINNED_CONNECTION_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);

fn is_memory_sqlite(url: &str) -> bool {
    url.starts_with("sqlite") && url.contains(":memory:")
}

/// 构造连接池参数
///
/// 内存 SQLite 每个连接都是独立的数据库，只能固定使用一个永不回收的连接
fn connect_options(url: &str, config: &StoreConfig) -> ConnectOptions {
    let mut opt = ConnectOptions::new(url.to_string());
    opt.min_connections(1)
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .sqlx_logging(false);

    if is_memory_sqlite(url) {
        opt.max_connections(1)
            .max_lifetime(PINNED_CONNECTION_LIFETIME)
            .idle_timeout(PINNED_CONNECTION_LIFETIME);
    } else {
        opt.max_connections(config.max_connections);
    }
    opt
}

/// SQL 缓存存储
pub struct SqlCacheStore {
    connection: DatabaseConnection,
    backend: DatabaseBackend,
    table: String,
}

impl std::fmt::Debug for SqlCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCacheStore")
            .field("backend", &self.backend)
            .field("table", &self.table)
            .finish()
    }
}

impl SqlCacheStore {
    /// 根据存储配置建立连接并确保缓存表存在
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let url = config
            .connection_string
            .as_ref()
            .ok_or_else(|| {
                CacheError::ConfigError("store.connection_string is required".to_string())
            })?
            .expose_secret()
            .to_string();

        let opt = connect_options(&url, config);
        info!(
            "Connecting property cache store: {}",
            redact_connection_string(&url)
        );
        let connection = Database::connect(opt)
            .await
            .map_err(|e| CacheError::DatabaseError(format!("Failed to open database: {}", e)))?;

        Self::from_connection(connection, &config.table_name).await
    }

    /// 使用已有连接创建存储
    pub async fn from_connection(connection: DatabaseConnection, table: &str) -> Result<Self> {
        validate_identifier(table).map_err(CacheError::ConfigError)?;
        let backend = connection.get_database_backend();
        let store = Self {
            connection,
            backend,
            table: table.to_string(),
        };
        store.ensure_table().await?;
        Ok(store)
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    async fn ensure_table(&self) -> Result<()> {
        let table = self.quoted_table();
        let sql = match self.backend {
            DatabaseBackend::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 entity_type VARCHAR(255) NOT NULL, \
                 entity_id BIGINT NOT NULL, \
                 name VARCHAR(64) NOT NULL, \
                 value BYTEA NOT NULL, \
                 UNIQUE (entity_type, entity_id, name))",
                table
            ),
            DatabaseBackend::MySql => format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 entity_type VARCHAR(255) NOT NULL, \
                 entity_id BIGINT NOT NULL, \
                 name VARCHAR(64) NOT NULL, \
                 value LONGBLOB NOT NULL, \
                 UNIQUE KEY uq_{}_key (entity_type, entity_id, name))",
                table, self.table
            ),
            DatabaseBackend::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 entity_type VARCHAR(255) NOT NULL, \
                 entity_id BIGINT NOT NULL, \
                 name VARCHAR(64) NOT NULL, \
                 value BLOB NOT NULL, \
                 UNIQUE (entity_type, entity_id, name))",
                table
            ),
        };
        debug!("Ensuring cache table with SQL: {}", sql);
        self.execute(&sql, Vec::new()).await?;
        Ok(())
    }

    fn quoted_table(&self) -> String {
        match self.backend {
            DatabaseBackend::MySql => format!("`{}`", self.table),
            _ => format!("\"{}\"", self.table),
        }
    }

    /// 第 n 个（从 1 开始）参数占位符
    fn placeholder(&self, n: usize) -> String {
        match self.backend {
            DatabaseBackend::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    async fn execute(&self, sql: &str, values: Vec<Value>) -> Result<u64> {
        let result = self
            .connection
            .execute(Statement::from_sql_and_values(self.backend, sql, values))
            .await
            .map_err(|e| CacheError::Store(format!("SQL execution failed: {}", e)))?;
        Ok(result.rows_affected())
    }

    async fn query_all(&self, sql: &str, values: Vec<Value>) -> Result<Vec<QueryResult>> {
        self.connection
            .query_all(Statement::from_sql_and_values(self.backend, sql, values))
            .await
            .map_err(|e| CacheError::Store(format!("SQL query failed: {}", e)))
    }
}

fn to_db_id(id: EntityId) -> Result<i64> {
    i64::try_from(id).map_err(|_| CacheError::Store(format!("entity id {} out of range", id)))
}

fn from_db_id(id: i64) -> Result<EntityId> {
    EntityId::try_from(id).map_err(|_| CacheError::Store(format!("negative entity id {}", id)))
}

#[async_trait]
impl CacheStore for SqlCacheStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
    ) -> Result<Option<Vec<u8>>> {
        let sql = format!(
            "SELECT value FROM {} WHERE entity_type = {} AND entity_id = {} AND name = {}",
            self.quoted_table(),
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3)
        );
        let rows = self
            .query_all(
                &sql,
                vec![
                    entity_type.as_str().into(),
                    to_db_id(entity_id)?.into(),
                    name.into(),
                ],
            )
            .await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_get::<Vec<u8>>("", "value")?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, ids), level = "debug", fields(ids = ids.len()))]
    async fn get_many(
        &self,
        entity_type: &EntityType,
        ids: &[EntityId],
    ) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() + 1);
            values.push(entity_type.as_str().into());
            let mut placeholders = Vec::with_capacity(chunk.len());
            for (offset, id) in chunk.iter().enumerate() {
                placeholders.push(self.placeholder(offset + 2));
                values.push(to_db_id(*id)?.into());
            }

            let sql = format!(
                "SELECT entity_id, name, value FROM {} WHERE entity_type = {} AND entity_id IN ({})",
                self.quoted_table(),
                self.placeholder(1),
                placeholders.join(", ")
            );

            for row in self.query_all(&sql, values).await? {
                entries.push(CacheEntry {
                    entity_type: entity_type.clone(),
                    entity_id: from_db_id(row.try_get::<i64>("", "entity_id")?)?,
                    property_name: row.try_get::<String>("", "name")?,
                    value: row.try_get::<Vec<u8>>("", "value")?,
                });
            }
        }
        debug!("SQL get_many: entries={}", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn upsert(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        let conflict_clause = match self.backend {
            DatabaseBackend::MySql => "ON DUPLICATE KEY UPDATE value = VALUES(value)",
            _ => "ON CONFLICT (entity_type, entity_id, name) DO UPDATE SET value = excluded.value",
        };
        let sql = format!(
            "INSERT INTO {} (entity_type, entity_id, name, value) VALUES ({}, {}, {}, {}) {}",
            self.quoted_table(),
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
            conflict_clause
        );
        self.execute(
            &sql,
            vec![
                entity_type.as_str().into(),
                to_db_id(entity_id)?.into(),
                name.into(),
                value.into(),
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(
        &self,
        entity_type: &EntityType,
        entity_id: EntityId,
        name: &str,
    ) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE entity_type = {} AND entity_id = {} AND name = {}",
            self.quoted_table(),
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3)
        );
        let affected = self
            .execute(
                &sql,
                vec![
                    entity_type.as_str().into(),
                    to_db_id(entity_id)?.into(),
                    name.into(),
                ],
            )
            .await?;
        Ok(affected > 0)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_all(&self, entity_type: &EntityType, entity_id: EntityId) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE entity_type = {} AND entity_id = {}",
            self.quoted_table(),
            self.placeholder(1),
            self.placeholder(2)
        );
        self.execute(
            &sql,
            vec![entity_type.as_str().into(), to_db_id(entity_id)?.into()],
        )
        .await
    }

    async fn stats(&self) -> Result<Vec<TypeStats>> {
        let sql = format!(
            "SELECT entity_type, COUNT(*) AS entries FROM {} GROUP BY entity_type ORDER BY entity_type",
            self.quoted_table()
        );
        let mut stats = Vec::new();
        for row in self.query_all(&sql, Vec::new()).await? {
            let entries = row.try_get::<i64>("", "entries")?;
            stats.push(TypeStats {
                entity_type: EntityType::new(row.try_get::<String>("", "entity_type")?),
                entries: u64::try_from(entries).unwrap_or(0),
            });
        }
        Ok(stats)
    }

    async fn clear(&self) -> Result<u64> {
        let sql = format!("DELETE FROM {}", self.quoted_table());
        self.execute(&sql, Vec::new()).await
    }
}
