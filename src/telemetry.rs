//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志输出的初始化。

use tracing_subscriber::EnvFilter;

/// 初始化 tracing 日志输出
///
/// 设置了 `RUST_LOG` 时以其为准，否则使用 `default_filter`。
/// 全局 subscriber 已存在时不做任何事，可以重复调用
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
