//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了管理员操作命令的实现。

use super::CliContext;
use crate::entity::{EntityId, EntityType};
use crate::serialization::Serializer;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct GetArgs {
    #[arg(short, long, help = "Entity type identifier")]
    pub entity_type: String,

    #[arg(short, long, help = "Entity instance id")]
    pub id: EntityId,

    #[arg(short, long, help = "Cached property name")]
    pub property: String,
}

#[derive(Parser, Debug)]
pub struct PurgeArgs {
    #[arg(short, long, help = "Entity type identifier")]
    pub entity_type: String,

    #[arg(short, long, help = "Entity instance id")]
    pub id: EntityId,

    #[arg(short, long, help = "Only purge this property")]
    pub property: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ClearArgs {
    #[arg(short, long, help = "Skip confirmation prompt")]
    pub yes: bool,
}

pub async fn execute_get(ctx: &CliContext, args: &GetArgs) -> Result<()> {
    let entity_type = EntityType::new(args.entity_type.clone());
    let bytes = ctx
        .store
        .get(&entity_type, args.id, &args.property)
        .await?;

    match bytes {
        Some(bytes) => {
            let value = ctx
                .config
                .serializer()
                .decode(&bytes)
                .context("Cached value could not be decoded")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => println!(
            "No cached value for {}#{}.{}",
            entity_type, args.id, args.property
        ),
    }
    Ok(())
}

pub async fn execute_purge(ctx: &CliContext, args: &PurgeArgs) -> Result<()> {
    let entity_type = EntityType::new(args.entity_type.clone());

    match &args.property {
        Some(property) => {
            let removed = ctx.store.delete(&entity_type, args.id, property).await?;
            if removed {
                println!("Purged {}#{}.{}", entity_type, args.id, property);
            } else {
                println!("No cached value for {}#{}.{}", entity_type, args.id, property);
            }
        }
        None => {
            let removed = ctx.store.delete_all(&entity_type, args.id).await?;
            println!("Purged {} entries of {}#{}", removed, entity_type, args.id);
        }
    }
    Ok(())
}

pub async fn execute_clear(ctx: &CliContext, args: &ClearArgs) -> Result<()> {
    if !args.yes {
        print!(
            "Delete every entry in '{}'? [y/N]: ",
            ctx.config.store.table_name
        );
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim().to_lowercase() != "y" {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    let removed = ctx.store.clear().await?;
    println!("Cleared {} cached entries.", removed);
    Ok(())
}
