//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态查询命令的实现。

use super::{CliContext, StatusArgs};
use crate::store::TypeStats;
use anyhow::Result;

pub async fn execute(ctx: &CliContext, args: &StatusArgs) -> Result<()> {
    let stats = ctx.store.stats().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("=== Property Cache Status ===\n");
    println!("Backend: {:?}", ctx.config.store.backend);
    println!("Table:   {}\n", ctx.config.store.table_name);
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &[TypeStats]) {
    if stats.is_empty() {
        println!("No cached entries.");
        return;
    }

    let width = stats
        .iter()
        .map(|s| s.entity_type.as_str().len())
        .max()
        .unwrap_or(0)
        .max("Entity type".len());

    println!("{:<width$}  Entries", "Entity type", width = width);
    let mut total = 0;
    for s in stats {
        println!("{:<width$}  {}", s.entity_type, s.entries, width = width);
        total += s.entries;
    }
    println!("\nTotal: {}", total);
}
