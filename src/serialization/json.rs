//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现。

use super::Serializer;
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// gzip 数据头，JSON 文本不会以该字节开头
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// JSON序列化器
///
/// 可选地使用 gzip 压缩。解码时根据数据头自动识别是否压缩，
/// 因此切换压缩配置后旧数据仍可读取
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    compress: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { compress: false }
    }

    /// 创建启用压缩的JSON序列化器
    pub fn with_compression() -> Self {
        Self { compress: true }
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    #[cfg(feature = "flate2")]
    fn compress(data: Vec<u8>) -> Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(&data)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    #[cfg(not(feature = "flate2"))]
    fn compress(data: Vec<u8>) -> Result<Vec<u8>> {
        Ok(data)
    }

    #[cfg(feature = "flate2")]
    fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(data);
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(decoded)
    }

    #[cfg(not(feature = "flate2"))]
    fn decompress(_data: &[u8]) -> Result<Vec<u8>> {
        Err(CacheError::Serialization(
            "compressed value found but flate2 support is disabled".to_string(),
        ))
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json_bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        if self.compress {
            Self::compress(json_bytes)
        } else {
            Ok(json_bytes)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        if data.starts_with(&GZIP_MAGIC) {
            let decoded = Self::decompress(data)?;
            return serde_json::from_slice(&decoded)
                .map_err(|e| CacheError::Serialization(e.to_string()));
        }
        serde_json::from_slice(data).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}
