//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了属性值的序列化机制。
//!
//! 缓存存储只保存不透明的字节，属性值在写入前由序列化器编码，
//! 读取时再解码为 [`PropertyValue`]。

pub mod json;

use crate::entity::PropertyValue;
use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use json::JsonSerializer;

/// 序列化器特征
///
/// 定义序列化和反序列化操作的接口
pub trait Serializer: Send + Sync {
    /// 序列化值为字节数组
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// 从字节数组反序列化值
    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;

    /// 编码属性值
    fn encode(&self, value: &PropertyValue) -> Result<Vec<u8>> {
        self.serialize(value)
    }

    /// 解码属性值
    fn decode(&self, data: &[u8]) -> Result<PropertyValue> {
        self.deserialize(data)
    }
}

/// 序列化器枚举
///
/// 根据配置在运行时选择具体的序列化器
#[derive(Clone, Debug)]
pub enum SerializerEnum {
    Json(JsonSerializer),
}

impl Default for SerializerEnum {
    fn default() -> Self {
        SerializerEnum::Json(JsonSerializer::new())
    }
}

impl Serializer for SerializerEnum {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializerEnum::Json(s) => s.serialize(value),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            SerializerEnum::Json(s) => s.deserialize(data),
        }
    }
}
